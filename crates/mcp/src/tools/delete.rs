use std::sync::Arc;

use async_trait::async_trait;
use pmcp::{RequestHandlerExtra, Result as McpResult, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use zendo_core::App;

use super::util::{internal_error, parse_args, service_error, validation_error};

/// Single-id lifecycle operations on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Soft delete: moves the task to the trash.
    Delete,
    Restore,
    /// Irreversible removal of a trashed task.
    Purge,
}

impl TaskAction {
    fn tool_name(self) -> &'static str {
        match self {
            TaskAction::Delete => "delete_task",
            TaskAction::Restore => "restore_task",
            TaskAction::Purge => "purge_task",
        }
    }

    fn description(self) -> &'static str {
        match self {
            TaskAction::Delete => "Move a task to the trash",
            TaskAction::Restore => "Bring a trashed task back to the active list",
            TaskAction::Purge => "Permanently delete a task; this cannot be undone",
        }
    }
}

pub struct TaskActionTool {
    app: Arc<App>,
    action: TaskAction,
}

impl TaskActionTool {
    pub fn new(app: Arc<App>, action: TaskAction) -> Self {
        Self { app, action }
    }
}

#[derive(Debug, Deserialize)]
struct TaskActionArgs {
    id: String,
}

#[async_trait]
impl ToolHandler for TaskActionTool {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let TaskActionArgs { id } = parse_args(args)?;
        if id.trim().is_empty() {
            return Err(validation_error("id is required"));
        }

        let tasks = self.app.tasks();
        let outcome = match self.action {
            TaskAction::Delete => tasks.delete(&id).await,
            TaskAction::Restore => tasks.restore(&id).await,
            TaskAction::Purge => tasks.permanently_delete(&id).await,
        }
        .map_err(service_error)?;

        serde_json::to_value(outcome).map_err(internal_error)
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            self.action.tool_name().to_string(),
            Some(self.action.description().to_string()),
            json!({
                "type": "object",
                "required": ["id"],
                "properties": {
                    "id": { "type": "string" }
                }
            }),
        ))
    }
}
