use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use pmcp::{RequestHandlerExtra, Result as McpResult, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use zendo_core::capture::{parse_due, TaskPatch};
use zendo_core::model::{Priority, TaskStatus};
use zendo_core::App;

use super::util::{internal_error, parse_args, service_error, validation_error};

pub struct UpdateTaskTool {
    app: Arc<App>,
}

impl UpdateTaskTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskArgs {
    id: String,
    title: Option<String>,
    description: Option<String>,
    due_date: Option<String>,
    due_time: Option<String>,
    priority: Option<String>,
    status: Option<String>,
}

impl UpdateTaskArgs {
    fn into_patch(self) -> Result<(String, TaskPatch)> {
        if self.id.trim().is_empty() {
            bail!("id is required");
        }
        if self.due_time.is_some() && self.due_date.is_none() {
            bail!("dueTime requires dueDate");
        }
        let patch = TaskPatch {
            title: self.title,
            description: self.description,
            due_date: self
                .due_date
                .as_deref()
                .map(|raw| parse_due(raw, self.due_time.as_deref()))
                .transpose()?,
            priority: self.priority.as_deref().map(Priority::from_str).transpose()?,
            status: self.status.as_deref().map(TaskStatus::from_str).transpose()?,
        };
        if patch.is_empty() {
            bail!("at least one field to update is required");
        }
        Ok((self.id, patch))
    }
}

#[async_trait]
impl ToolHandler for UpdateTaskTool {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let parsed: UpdateTaskArgs = parse_args(args)?;
        let (id, patch) = parsed.into_patch().map_err(validation_error)?;

        let outcome = self
            .app
            .tasks()
            .update(&id, patch)
            .await
            .map_err(service_error)?;

        serde_json::to_value(outcome).map_err(internal_error)
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "update_task".to_string(),
            Some(
                "Change any of a task's title, description, due date, priority or status"
                    .to_string(),
            ),
            json!({
                "type": "object",
                "required": ["id"],
                "properties": {
                    "id": { "type": "string" },
                    "title": { "type": "string", "maxLength": 100 },
                    "description": { "type": "string" },
                    "dueDate": { "type": "string" },
                    "dueTime": { "type": "string" },
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
    use zendo_core::capture::TaskDraft;
    use zendo_core::model::TaskFilters;
    use zendo_core::MutationOutcome;

    use crate::tools::util::{test_app, test_extra};

    async fn seed(app: &App) -> String {
        match app
            .tasks()
            .create(TaskDraft::new("Review PR"))
            .await
            .expect("create")
        {
            MutationOutcome::Created(id) => id,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn updates_status_and_priority() {
        let (app, _dir) = test_app().await;
        let id = seed(&app).await;
        let tool = UpdateTaskTool::new(app.clone());

        let response = tool
            .handle(
                json!({ "id": id, "status": "in-progress", "priority": "high" }),
                test_extra(),
            )
            .await
            .expect("update");
        assert_eq!(response["outcome"], json!("applied"));

        let tasks = app
            .tasks()
            .list(TaskFilters::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
        assert_eq!(tasks[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn rejects_empty_patch_and_unknown_task() {
        let (app, _dir) = test_app().await;
        let tool = UpdateTaskTool::new(app);

        assert!(tool
            .handle(json!({ "id": "01ABC" }), test_extra())
            .await
            .is_err());
        assert!(tool
            .handle(json!({ "id": "missing", "title": "New" }), test_extra())
            .await
            .is_err());
    }
}
