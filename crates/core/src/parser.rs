use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::Clock;
use crate::llm::{ChatMessage, CompletionClient, CompletionRequest};
use crate::model::ParsedTask;
use crate::normalize;

pub const PARSE_TEMPERATURE: f32 = 0.1;
pub const PARSE_MAX_TOKENS: u32 = 500;

static JSON_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("input required")]
    EmptyInput,
    #[error("model returned an empty response")]
    UpstreamEmptyResponse,
    #[error("could not parse model response as JSON")]
    MalformedJson,
    #[error("response is missing a valid task title")]
    MissingTitle,
    #[error("{0}")]
    Upstream(String),
}

/// Wire shape returned to the UI: `{success, data?, error?, rawInput}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ParsedTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub raw_input: String,
}

impl ParseResponse {
    pub fn from_result(raw_input: &str, result: Result<ParsedTask, ParseFailure>) -> Self {
        match result {
            Ok(task) => Self {
                success: true,
                data: Some(task),
                error: None,
                raw_input: raw_input.to_string(),
            },
            Err(failure) => Self {
                success: false,
                data: None,
                error: Some(failure.to_string()),
                raw_input: raw_input.to_string(),
            },
        }
    }
}

/// Turns a free-text sentence into a [`ParsedTask`] with the help of a completion model.
#[derive(Clone)]
pub struct TaskParser {
    client: Arc<dyn CompletionClient>,
    clock: Arc<dyn Clock>,
}

impl TaskParser {
    pub fn new(client: Arc<dyn CompletionClient>, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    /// Never fails: every error is folded into the response.
    pub async fn parse(&self, input: &str) -> ParseResponse {
        let result = self.parse_task(input).await;
        if let Err(failure) = &result {
            tracing::warn!(error = %failure, "task parsing failed");
        }
        ParseResponse::from_result(input, result)
    }

    pub async fn parse_task(&self, input: &str) -> Result<ParsedTask, ParseFailure> {
        if input.trim().is_empty() {
            return Err(ParseFailure::EmptyInput);
        }

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(build_system_prompt(self.clock.today_local())),
                ChatMessage::user(input),
            ],
            temperature: PARSE_TEMPERATURE,
            max_tokens: PARSE_MAX_TOKENS,
        };

        let content = self
            .client
            .complete(request)
            .await
            .map_err(|err| ParseFailure::Upstream(err.to_string()))?
            .ok_or(ParseFailure::UpstreamEmptyResponse)?;

        let value = extract_json(&content)?;
        validate_reply(&value)
    }
}

pub fn build_system_prompt(today: NaiveDate) -> String {
    let weekday = weekday_name(today.weekday());
    format!(
        r#"You are a task parsing assistant. The user describes a task in natural language and you extract structured fields.

Current date: {today} ({weekday})

Return exactly one JSON object of this shape:

{{
  "title": "short task title (required)",
  "description": "extra detail (optional)",
  "dueDate": "due date as YYYY-MM-DD (optional)",
  "dueTime": "due time as HH:mm, 24-hour clock (optional)",
  "priority": "low | medium | high | urgent",
  "confidence": "a number between 0 and 1"
}}

Rules:
1. Keep the title short and remove every date or time phrase from it.
2. Dates:
   - "today" is {today}; "tomorrow" and "the day after tomorrow" count forward from it.
   - A bare weekday ("Friday") means the next such day in the current week, or next week if it has passed.
   - "next Wednesday" means Wednesday of the following week.
   - Numeric shorthand such as 0901 or 12/25 means month and day in the current year (for example {year}-09-01, {year}-12-25).
3. Times: "3pm" is 15:00, "8 in the evening" is 20:00, "10 in the morning" is 10:00.
4. Priority:
   - urgent: urgent, immediately, right now, ASAP
   - high: important, critical, must
   - medium: ordinary tasks (default)
   - low: later, when free, someday
5. If no time is mentioned, omit dueDate and dueTime.
6. Base confidence on how certain the extraction is.

Reply with the JSON object only, no other text."#,
        today = today.format("%Y-%m-%d"),
        weekday = weekday,
        year = today.year(),
    )
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parses the reply directly, falling back to the outermost `{...}` span.
pub fn extract_json(content: &str) -> Result<Value, ParseFailure> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        return Ok(value);
    }
    let span = JSON_OBJECT_RE
        .find(content)
        .ok_or(ParseFailure::MalformedJson)?;
    serde_json::from_str::<Value>(span.as_str()).map_err(|_| ParseFailure::MalformedJson)
}

/// Validates each field independently; only a missing title rejects the reply.
pub fn validate_reply(value: &Value) -> Result<ParsedTask, ParseFailure> {
    let object = value.as_object().ok_or(ParseFailure::MissingTitle)?;
    let title = normalize::text(object.get("title")).ok_or(ParseFailure::MissingTitle)?;

    Ok(ParsedTask {
        title,
        description: normalize::text(object.get("description")),
        due_date: normalize::date(object.get("dueDate")),
        due_time: normalize::time(object.get("dueTime")),
        priority: normalize::priority(object.get("priority")),
        confidence: normalize::confidence(object.get("confidence")),
    })
}
