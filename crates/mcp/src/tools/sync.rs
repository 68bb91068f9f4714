use std::sync::Arc;

use async_trait::async_trait;
use pmcp::{RequestHandlerExtra, Result as McpResult, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use zendo_core::App;

use super::util::{internal_error, parse_args};

/// Replays the offline mutation queue and reports what is left.
pub struct SyncQueueTool {
    app: Arc<App>,
}

impl SyncQueueTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncQueueArgs {
    #[serde(default)]
    clear_failed: bool,
    online: Option<bool>,
}

#[async_trait]
impl ToolHandler for SyncQueueTool {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let parsed: SyncQueueArgs = if args.is_null() {
            SyncQueueArgs::default()
        } else {
            parse_args(args)?
        };
        let queue = self.app.tasks().queue();
        if let Some(online) = parsed.online {
            self.app.tasks().connectivity().set_online(online);
        }

        let outcome = self.app.tasks().sync().await;
        if parsed.clear_failed {
            queue.clear_failed().await.map_err(internal_error)?;
        }
        let failed = queue.failed().await.map_err(internal_error)?;

        Ok(json!({
            "result": outcome,
            "online": self.app.tasks().connectivity().is_online(),
            "pending": queue.pending().await,
            "failed": failed,
        }))
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "sync_queue".to_string(),
            Some(
                "Replay mutations saved while offline and list anything still pending or dropped"
                    .to_string(),
            ),
            json!({
                "type": "object",
                "properties": {
                    "clearFailed": {
                        "type": "boolean",
                        "description": "Forget mutations that exhausted their retries"
                    },
                    "online": {
                        "type": "boolean",
                        "description": "Mark the connection as up or down before replaying"
                    }
                }
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zendo_core::capture::TaskDraft;
    use zendo_core::model::TaskFilters;
    use zendo_core::MutationOutcome;

    use crate::tools::util::{test_app, test_extra};

    #[tokio::test]
    async fn empty_queue_is_skipped() {
        let (app, _dir) = test_app().await;
        let response = SyncQueueTool::new(app)
            .handle(json!({}), test_extra())
            .await
            .expect("sync");
        assert_eq!(response["result"]["status"], json!("skipped"));
        assert_eq!(response["result"]["reason"], json!("empty"));
        assert_eq!(response["pending"], json!([]));
    }

    #[tokio::test]
    async fn replays_mutations_saved_offline() {
        let (app, _dir) = test_app().await;
        app.tasks().connectivity().set_online(false);
        let outcome = app
            .tasks()
            .create(TaskDraft::new("Written on the train"))
            .await
            .expect("create offline");
        assert!(matches!(outcome, MutationOutcome::Queued(_)));

        app.tasks().connectivity().set_online(true);
        let response = SyncQueueTool::new(app.clone())
            .handle(json!({}), test_extra())
            .await
            .expect("sync");
        assert_eq!(response["result"]["status"], json!("completed"));
        assert_eq!(response["result"]["succeeded"].as_array().map(Vec::len), Some(1));
        assert_eq!(response["pending"], json!([]));

        let tasks = app
            .tasks()
            .list(TaskFilters::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Written on the train");
    }

    #[tokio::test]
    async fn online_flag_toggles_connectivity_before_replay() {
        let (app, _dir) = test_app().await;
        let tool = SyncQueueTool::new(app.clone());

        let response = tool
            .handle(json!({ "online": false }), test_extra())
            .await
            .expect("go offline");
        assert_eq!(response["online"], json!(false));
        assert_eq!(response["result"]["reason"], json!("offline"));

        let outcome = app
            .tasks()
            .create(TaskDraft::new("Queued while away"))
            .await
            .expect("create offline");
        assert!(matches!(outcome, MutationOutcome::Queued(_)));

        let response = tool
            .handle(json!({ "online": true }), test_extra())
            .await
            .expect("go online");
        assert_eq!(response["online"], json!(true));
        assert_eq!(response["result"]["status"], json!("completed"));
        assert_eq!(response["pending"], json!([]));
    }
}
