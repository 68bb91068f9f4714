use std::sync::Arc;

use async_trait::async_trait;
use pmcp::{RequestHandlerExtra, Result as McpResult, ToolHandler};
use serde_json::{json, Value};
use zendo_core::App;

use super::util::{internal_error, validation_error};

/// The natural-language parse endpoint.
pub struct ParseTaskTool {
    app: Arc<App>,
}

impl ParseTaskTool {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

/// A missing, non-string or blank `input` is rejected before the model is called.
fn require_input(args: &Value) -> McpResult<String> {
    match args.get("input") {
        Some(Value::String(input)) if !input.trim().is_empty() => Ok(input.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(validation_error("input is required"))
        }
        Some(_) => Err(validation_error("input must be a string")),
    }
}

#[async_trait]
impl ToolHandler for ParseTaskTool {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> McpResult<Value> {
        let input = require_input(&args)?;
        let response = self.app.parser().parse(&input).await;
        serde_json::to_value(response).map_err(internal_error)
    }

    fn metadata(&self) -> Option<pmcp::types::ToolInfo> {
        Some(pmcp::types::ToolInfo::new(
            "parse_task".to_string(),
            Some(
                "Turn a natural-language sentence into a structured task (title, due date, time, priority)"
                    .to_string(),
            ),
            json!({
                "type": "object",
                "required": ["input"],
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Free text such as \"submit the report by Friday 3pm, urgent\""
                    }
                }
            }),
        ))
    }
}
