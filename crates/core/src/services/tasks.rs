use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::capture::{CaptureError, TaskDraft, TaskPatch};
use crate::clock::Clock;
use crate::connectivity::Connectivity;
use crate::model::{Task, TaskFilters};
use crate::notify::{Notice, Notifier};
use crate::repository::{RepositoryError, TaskApi};
use crate::services::cache::{KeyScope, QueryCache, QueryKey, Snapshot};
use crate::services::queue::{
    DrainOutcome, Mutation, OfflineQueue, QueueDeps, QueueStorage, QueueStorageError,
};
use crate::stats::TaskStats;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("User not authenticated")]
    NotSignedIn,
    #[error("{0}")]
    Invalid(#[from] CaptureError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("failed to persist offline queue: {0}")]
    Queue(#[from] QueueStorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "camelCase")]
pub enum MutationOutcome {
    /// Confirmed by the store.
    Applied,
    Created(String),
    /// Parked in the offline queue; carries the queued mutation id.
    Queued(String),
}

/// Collaborators the service is assembled from.
pub struct ServiceParts {
    pub api: Arc<dyn TaskApi>,
    pub queue_storage: Arc<dyn QueueStorage>,
    pub dead_letters: Arc<dyn QueueStorage>,
    pub connectivity: Connectivity,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

/// Reads through the query cache and writes with optimistic updates,
/// falling back to the offline queue when the store cannot be reached.
pub struct TasksService {
    api: Arc<dyn TaskApi>,
    cache: Arc<QueryCache>,
    queue: Arc<OfflineQueue>,
    connectivity: Connectivity,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    user: RwLock<Option<String>>,
}

impl TasksService {
    pub async fn open(parts: ServiceParts) -> Self {
        let cache = Arc::new(QueryCache::new(parts.clock.clone()));
        let queue = OfflineQueue::open(
            parts.queue_storage,
            parts.dead_letters,
            QueueDeps {
                api: parts.api.clone(),
                cache: cache.clone(),
                connectivity: parts.connectivity.clone(),
                notifier: parts.notifier.clone(),
                clock: parts.clock.clone(),
            },
        )
        .await;
        Self {
            api: parts.api,
            cache,
            queue,
            connectivity: parts.connectivity,
            notifier: parts.notifier,
            clock: parts.clock,
            user: RwLock::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn user(&self) -> Option<String> {
        self.user.read().clone()
    }

    /// Switching users drops every cached query.
    pub fn set_user(&self, user_id: Option<String>) {
        let mut current = self.user.write();
        if *current != user_id {
            self.cache.clear();
            *current = user_id;
        }
    }

    /// `None` while nobody is signed in.
    pub async fn list(&self, filters: TaskFilters) -> Result<Option<Vec<Task>>, ServiceError> {
        let Some(user) = self.user() else {
            return Ok(None);
        };
        self.query(QueryKey::list(user, filters)).await.map(Some)
    }

    pub async fn list_deleted(&self) -> Result<Option<Vec<Task>>, ServiceError> {
        let Some(user) = self.user() else {
            return Ok(None);
        };
        self.query(QueryKey::deleted(user)).await.map(Some)
    }

    pub async fn stats(&self) -> Result<Option<TaskStats>, ServiceError> {
        let tasks = self.list(TaskFilters::default()).await?;
        Ok(tasks.map(|tasks| TaskStats::compute(&tasks, self.clock.now())))
    }

    /// No optimistic insert: the id is only known once the store answers.
    pub async fn create(&self, draft: TaskDraft) -> Result<MutationOutcome, ServiceError> {
        let user = self.require_user()?;
        let draft = draft.validate()?;
        let mutation = Mutation::Create {
            user_id: user.clone(),
            draft: draft.clone(),
        };

        if !self.connectivity.is_online() {
            return self.park(mutation).await;
        }

        match self.api.create(&user, draft).await {
            Ok(id) => {
                self.cache.invalidate(&KeyScope::Lists(user));
                self.notifier
                    .notify(Notice::success("Task created", "Task has been created"));
                Ok(MutationOutcome::Created(id))
            }
            Err(err) => self.fail("Create failed", err, mutation).await,
        }
    }

    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<MutationOutcome, ServiceError> {
        let user = self.require_user()?;
        let patch = patch.validate()?;
        let scope = KeyScope::Lists(user);
        let now = self.clock.now();

        let snapshot = self.optimistic(&scope, |tasks| {
            for task in tasks.iter_mut().filter(|t| t.id == id) {
                merge_patch(task, &patch, now);
            }
        });
        let outcome = self
            .commit(
                Mutation::Update {
                    id: id.to_string(),
                    patch,
                },
                snapshot,
                ("Task updated", "Task has been updated"),
                "Update failed",
            )
            .await;
        self.cache.invalidate(&scope);
        outcome
    }

    /// Moves a task to the trash.
    pub async fn delete(&self, id: &str) -> Result<MutationOutcome, ServiceError> {
        let user = self.require_user()?;
        let snapshot = self.optimistic(&KeyScope::Lists(user.clone()), |tasks| {
            tasks.retain(|t| t.id != id)
        });
        let outcome = self
            .commit(
                Mutation::Delete { id: id.to_string() },
                snapshot,
                ("Task deleted", "Task moved to trash"),
                "Delete failed",
            )
            .await;
        self.cache.invalidate(&KeyScope::User(user));
        outcome
    }

    pub async fn restore(&self, id: &str) -> Result<MutationOutcome, ServiceError> {
        let user = self.require_user()?;
        let snapshot = self.optimistic(&KeyScope::Deleted(user.clone()), |tasks| {
            tasks.retain(|t| t.id != id)
        });
        let outcome = self
            .commit(
                Mutation::Restore { id: id.to_string() },
                snapshot,
                ("Task restored", "Task has been restored"),
                "Restore failed",
            )
            .await;
        self.cache.invalidate(&KeyScope::User(user));
        outcome
    }

    pub async fn permanently_delete(&self, id: &str) -> Result<MutationOutcome, ServiceError> {
        let user = self.require_user()?;
        let snapshot = self.optimistic(&KeyScope::Deleted(user.clone()), |tasks| {
            tasks.retain(|t| t.id != id)
        });
        let outcome = self
            .commit(
                Mutation::PermanentDelete { id: id.to_string() },
                snapshot,
                ("Task deleted", "Task permanently deleted"),
                "Delete failed",
            )
            .await;
        self.cache.invalidate(&KeyScope::User(user));
        outcome
    }

    pub async fn sync(&self) -> DrainOutcome {
        self.queue.drain().await
    }

    fn require_user(&self) -> Result<String, ServiceError> {
        self.user().ok_or(ServiceError::NotSignedIn)
    }

    async fn query(&self, key: QueryKey) -> Result<Vec<Task>, ServiceError> {
        if self.cache.is_fresh(&key) {
            if let Some(tasks) = self.cache.get(&key) {
                tracing::debug!(key = ?key, "serving fresh query");
                return Ok(tasks);
            }
        }
        if !self.connectivity.is_online() {
            if let Some(tasks) = self.cache.get(&key) {
                return Ok(tasks);
            }
        }

        let ticket = self.cache.begin_fetch(&key);
        let fetched = match &key {
            QueryKey::List { user_id, filters } => {
                self.api.list(user_id).await.map(|tasks| filters.apply(tasks))
            }
            QueryKey::Deleted { user_id } => self.api.list_deleted(user_id).await,
        };

        match fetched {
            Ok(tasks) => {
                if self.cache.complete_fetch(ticket, tasks.clone()) {
                    Ok(tasks)
                } else {
                    Ok(self.cache.get(&key).unwrap_or(tasks))
                }
            }
            Err(err) => match self.cache.get(&key) {
                Some(cached) => {
                    tracing::warn!(key = ?key, error = %err, "refresh failed, serving cached tasks");
                    Ok(cached)
                }
                None => Err(err.into()),
            },
        }
    }

    /// Cancels in-flight refreshes, snapshots and then edits the cached values.
    fn optimistic<F>(&self, scope: &KeyScope, edit: F) -> Snapshot
    where
        F: FnMut(&mut Vec<Task>),
    {
        self.cache.cancel(scope);
        let snapshot = self.cache.snapshot(scope);
        self.cache.update_where(scope, edit);
        snapshot
    }

    async fn commit(
        &self,
        mutation: Mutation,
        snapshot: Snapshot,
        success: (&str, &str),
        failure_title: &str,
    ) -> Result<MutationOutcome, ServiceError> {
        if !self.connectivity.is_online() {
            return self.park(mutation).await;
        }
        match mutation.apply(self.api.as_ref()).await {
            Ok(()) => {
                self.notifier.notify(Notice::success(success.0, success.1));
                Ok(MutationOutcome::Applied)
            }
            Err(err) => {
                self.cache.restore(snapshot);
                self.fail(failure_title, err, mutation).await
            }
        }
    }

    /// Offline: the optimistic state stays and the mutation waits for a drain.
    async fn park(&self, mutation: Mutation) -> Result<MutationOutcome, ServiceError> {
        let id = self.queue.enqueue(mutation).await?;
        self.notifier.notify(Notice::info(
            "Saved offline",
            "Changes will sync when the connection is restored",
        ));
        Ok(MutationOutcome::Queued(id))
    }

    async fn fail(
        &self,
        title: &str,
        err: RepositoryError,
        mutation: Mutation,
    ) -> Result<MutationOutcome, ServiceError> {
        if err.is_transient() {
            let id = self.queue.enqueue(mutation).await?;
            self.notifier.notify(Notice::warning(
                title,
                format!("{}; the change was queued and will be retried", err),
            ));
            return Ok(MutationOutcome::Queued(id));
        }
        self.notifier.notify(Notice::error(title, err.to_string()));
        Err(err.into())
    }
}

fn merge_patch(task: &mut Task, patch: &TaskPatch, now: DateTime<Utc>) {
    if let Some(title) = &patch.title {
        task.title = title.clone();
    }
    if let Some(description) = &patch.description {
        task.description = Some(description.clone());
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = Some(due_date);
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(status) = patch.status {
        task.status = status;
    }
    task.updated_at = now;
}
