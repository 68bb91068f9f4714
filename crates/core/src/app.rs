use std::sync::Arc;

use anyhow::{Context, Result};

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::connectivity::Connectivity;
use crate::database::SqliteStore;
use crate::history::HistoryService;
use crate::llm::{CompletionClient, OpenAiClient};
use crate::notify::Notifier;
use crate::parser::TaskParser;
use crate::repository::TaskRepository;
use crate::services::queue::FileQueueStorage;
use crate::services::{ServiceParts, TasksService};

/// Every service wired against the on-disk state under the configured data directory.
pub struct App {
    config: AppConfig,
    tasks: Arc<TasksService>,
    parser: TaskParser,
    history: HistoryService,
}

impl App {
    pub async fn open(config: AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = SqliteStore::new(config.clone())?;
        let client: Arc<dyn CompletionClient> = Arc::new(
            OpenAiClient::new(config.llm().clone()).context("Failed to build LLM client")?,
        );
        if config.llm().api_key.is_none() {
            tracing::warn!("no LLM API key configured; parsing and history will fall back");
        }

        let tasks = TasksService::open(ServiceParts {
            api: Arc::new(TaskRepository::new(Arc::new(store), clock.clone())),
            queue_storage: Arc::new(FileQueueStorage::new(config.queue_path())),
            dead_letters: Arc::new(FileQueueStorage::dead_letters_for(config.queue_path())),
            connectivity: Connectivity::new(!config.offline()),
            notifier,
            clock: clock.clone(),
        })
        .await;
        tasks.set_user(config.user_id().map(str::to_string));

        let parser = TaskParser::new(client.clone(), clock.clone());
        let history = HistoryService::new(client, clock, config.cache_dir());

        tracing::debug!(
            data_dir = %config.data_dir().display(),
            offline = config.offline(),
            "application state opened"
        );
        Ok(Self {
            config,
            tasks: Arc::new(tasks),
            parser,
            history,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tasks(&self) -> &Arc<TasksService> {
        &self.tasks
    }

    pub fn parser(&self) -> &TaskParser {
        &self.parser
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }
}
