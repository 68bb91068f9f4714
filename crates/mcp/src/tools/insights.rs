use std::sync::Arc;

use async_trait::async_trait;
use pmcp::{RequestHandlerExtra, Result as McpResult, ToolHandler};
use serde_json::{json, Value};
use zendo_core::services::ServiceError;
use zendo_core::App;

use super::util::{internal_error, service_error};

pub struct TaskStatsTool {
    app: Arc<App>,
}

impl TaskStatsTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl ToolHandler for TaskStatsTool {
    async fn handle(&self, _args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let stats = self
            .app
            .tasks()
            .stats()
            .await
            .map_err(service_error)?
            .ok_or_else(|| service_error(ServiceError::NotSignedIn))?;
        serde_json::to_value(stats).map_err(internal_error)
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "task_stats".to_string(),
            Some(
                "Counts by status and priority, overdue tasks and the completion rate".to_string(),
            ),
            json!({ "type": "object", "properties": {} }),
        ))
    }
}

pub struct TodayInHistoryTool {
    app: Arc<App>,
}

impl TodayInHistoryTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl ToolHandler for TodayInHistoryTool {
    async fn handle(&self, _args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let response = self.app.history().today().await;
        serde_json::to_value(response).map_err(internal_error)
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "today_in_history".to_string(),
            Some("Notable events that happened on today's date".to_string()),
            json!({ "type": "object", "properties": {} }),
        ))
    }
}
