use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ParsedTask, Priority, TaskStatus};

pub const MAX_TITLE_CHARS: usize = 100;

/// Payload for creating a task from any client (CLI, tool server, parsed text).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Pre-fill the create form from a parser result.
    pub fn from_parsed(parsed: &ParsedTask) -> Self {
        let due_date = parsed
            .due_date
            .as_deref()
            .and_then(|date| combine_local(date, parsed.due_time.as_deref()));
        Self {
            title: parsed.title.clone(),
            description: parsed.description.clone(),
            due_date,
            priority: parsed.priority,
            status: TaskStatus::Todo,
        }
    }

    /// Trim the free-text fields and check the title constraints.
    pub fn validate(mut self) -> Result<Self, CaptureError> {
        self.title = validate_title(&self.title)?;
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Ok(self)
    }
}

/// Partial update; only present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.status.is_none()
    }

    pub fn validate(mut self) -> Result<Self, CaptureError> {
        if let Some(title) = &self.title {
            self.title = Some(validate_title(title)?);
        }
        Ok(self)
    }
}

fn validate_title(raw: &str) -> Result<String, CaptureError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(CaptureError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(CaptureError::TitleTooLong);
    }
    Ok(title.to_string())
}

/// Accepts an RFC 3339 timestamp, or a `YYYY-MM-DD` date with an optional
/// `HH:mm` time read in local time.
pub fn parse_due(raw: &str, time: Option<&str>) -> Result<DateTime<Utc>, CaptureError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Some(time) = time {
        if NaiveTime::parse_from_str(time.trim(), "%H:%M").is_err() {
            return Err(CaptureError::InvalidDueDate(format!("{} {}", raw, time)));
        }
    }
    combine_local(raw, time.map(str::trim))
        .ok_or_else(|| CaptureError::InvalidDueDate(raw.to_string()))
}

fn combine_local(date: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = time
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
        .or_else(|| NaiveTime::from_hms_opt(9, 0, 0))?;
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    EmptyTitle,
    TitleTooLong,
    InvalidDueDate(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::EmptyTitle => write!(f, "Title is required"),
            CaptureError::TitleTooLong => write!(
                f,
                "Title must be less than {} characters",
                MAX_TITLE_CHARS
            ),
            CaptureError::InvalidDueDate(raw) => write!(
                f,
                "Invalid due date '{}': expected YYYY-MM-DD, optional HH:mm, or RFC 3339",
                raw
            ),
        }
    }
}

impl std::error::Error for CaptureError {}
