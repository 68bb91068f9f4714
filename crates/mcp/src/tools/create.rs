use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use pmcp::{RequestHandlerExtra, Result as McpResult, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use zendo_core::capture::{parse_due, TaskDraft};
use zendo_core::model::{Priority, TaskStatus};
use zendo_core::App;

use super::util::{internal_error, parse_args, service_error, validation_error};

pub struct CreateTaskTool {
    app: Arc<App>,
}

impl CreateTaskTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskArgs {
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    due_time: Option<String>,
    priority: Option<String>,
    status: Option<String>,
}

impl CreateTaskArgs {
    fn into_draft(self) -> Result<TaskDraft> {
        let due_date = self
            .due_date
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_due(raw, self.due_time.as_deref()))
            .transpose()?;
        let priority = match self.priority {
            Some(priority) => Priority::from_str(&priority)?,
            None => Priority::default(),
        };
        let status = match self.status {
            Some(status) => TaskStatus::from_str(&status)?,
            None => TaskStatus::default(),
        };
        Ok(TaskDraft {
            title: self.title,
            description: self.description,
            due_date,
            priority,
            status,
        })
    }
}

#[async_trait]
impl ToolHandler for CreateTaskTool {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let parsed: CreateTaskArgs = parse_args(args)?;
        let draft = parsed.into_draft().map_err(validation_error)?;

        let outcome = self
            .app
            .tasks()
            .create(draft)
            .await
            .map_err(service_error)?;

        serde_json::to_value(outcome).map_err(internal_error)
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "create_task".to_string(),
            Some("Create a task for the configured user".to_string()),
            json!({
                "type": "object",
                "required": ["title"],
                "properties": {
                    "title": { "type": "string", "maxLength": 100 },
                    "description": { "type": "string" },
                    "dueDate": {
                        "type": "string",
                        "description": "YYYY-MM-DD (local) or RFC 3339 timestamp"
                    },
                    "dueTime": {
                        "type": "string",
                        "pattern": "^([01]?[0-9]|2[0-3]):[0-5][0-9]$",
                        "description": "HH:mm, combined with a YYYY-MM-DD dueDate"
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["low", "medium", "high", "urgent"]
                    },
                    "status": {
                        "type": "string",
                        "enum": ["todo", "in-progress", "done", "archived"]
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
    use zendo_core::model::TaskFilters;

    use crate::tools::util::{test_app, test_extra};

    #[tokio::test]
    async fn create_persists_task() {
        let (app, _dir) = test_app().await;
        let tool = CreateTaskTool::new(app.clone());

        let response = tool
            .handle(
                json!({
                    "title": "Write integration tests",
                    "description": "Cover MCP flow",
                    "dueDate": "2025-04-01",
                    "priority": "urgent"
                }),
                test_extra(),
            )
            .await
            .expect("create result");
        assert_eq!(response["outcome"], json!("created"));

        let tasks = app
            .tasks()
            .list(TaskFilters::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Write integration tests");
        assert_eq!(tasks[0].priority, Priority::Urgent);
        assert!(tasks[0].due_date.is_some());
        assert_eq!(response["id"], json!(tasks[0].id));
    }

    #[tokio::test]
    async fn rejects_blank_title_and_unknown_priority() {
        let (app, _dir) = test_app().await;
        let tool = CreateTaskTool::new(app);

        assert!(tool
            .handle(json!({ "title": "  " }), test_extra())
            .await
            .is_err());
        assert!(tool
            .handle(json!({ "title": "ok", "priority": "asap" }), test_extra())
            .await
            .is_err());
    }
}
