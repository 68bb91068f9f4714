use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use pmcp::{RequestHandlerExtra, Result as McpResult, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use zendo_core::model::{Priority, TaskFilters, TaskStatus};
use zendo_core::App;

use super::util::{parse_args, service_error, signed_in, validation_error};

pub struct ListTasksTool {
    app: Arc<App>,
}

impl ListTasksTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksArgs {
    status: Option<String>,
    priority: Option<String>,
    search: Option<String>,
}

impl ListTasksArgs {
    fn to_filters(&self) -> Result<TaskFilters> {
        let mut filters = TaskFilters::default();
        if let Some(status) = &self.status {
            filters.status = Some(TaskStatus::from_str(status)?);
        }
        if let Some(priority) = &self.priority {
            filters.priority = Some(Priority::from_str(priority)?);
        }
        filters.search = self
            .search
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(filters)
    }
}

#[async_trait]
impl ToolHandler for ListTasksTool {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let parsed: ListTasksArgs = if args.is_null() {
            ListTasksArgs::default()
        } else {
            parse_args(args)?
        };
        let filters = parsed.to_filters().map_err(validation_error)?;

        let tasks = self
            .app
            .tasks()
            .list(filters.clone())
            .await
            .map_err(service_error)?;
        let tasks = signed_in(tasks)?;

        Ok(json!({
            "tasks": tasks,
            "count": tasks.len(),
            "filters": filters,
        }))
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "list_tasks".to_string(),
            Some(
                "List active tasks, newest first, with optional status, priority and text filters"
                    .to_string(),
            ),
            json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["todo", "in-progress", "done", "archived"]
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["low", "medium", "high", "urgent"]
                    },
                    "search": {
                        "type": "string",
                        "description": "Case-insensitive match against title and description"
                    }
                }
            }),
        ))
    }
}

pub struct ListTrashTool {
    app: Arc<App>,
}

impl ListTrashTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl ToolHandler for ListTrashTool {
    async fn handle(&self, _args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let tasks = self
            .app
            .tasks()
            .list_deleted()
            .await
            .map_err(service_error)?;
        let tasks = signed_in(tasks)?;
        Ok(json!({ "tasks": tasks, "count": tasks.len() }))
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "list_trash".to_string(),
            Some("List soft-deleted tasks, most recently deleted first".to_string()),
            json!({ "type": "object", "properties": {} }),
        ))
    }
}
