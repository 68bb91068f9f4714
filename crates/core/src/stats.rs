use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{Priority, Task, TaskStatus};

const RECENT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub archived: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub urgent: usize,
}

/// Dashboard numbers over the active (non-trashed) task list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_priority: PriorityCounts,
    pub overdue: usize,
    /// Rounded percentage of done tasks.
    pub completion_rate: u32,
    pub created_last_7_days: usize,
    pub completed_last_7_days: usize,
}

impl TaskStats {
    pub fn compute(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let window_start = now - Duration::days(RECENT_WINDOW_DAYS);
        let mut stats = TaskStats::default();

        for task in tasks.iter().filter(|t| !t.is_trashed()) {
            stats.total += 1;
            match task.status {
                TaskStatus::Todo => stats.by_status.todo += 1,
                TaskStatus::InProgress => stats.by_status.in_progress += 1,
                TaskStatus::Done => stats.by_status.done += 1,
                TaskStatus::Archived => stats.by_status.archived += 1,
            }
            match task.priority {
                Priority::Low => stats.by_priority.low += 1,
                Priority::Medium => stats.by_priority.medium += 1,
                Priority::High => stats.by_priority.high += 1,
                Priority::Urgent => stats.by_priority.urgent += 1,
            }
            if task.is_overdue(now) {
                stats.overdue += 1;
            }
            if task.created_at >= window_start {
                stats.created_last_7_days += 1;
            }
            if task.status == TaskStatus::Done && task.updated_at >= window_start {
                stats.completed_last_7_days += 1;
            }
        }

        if stats.total > 0 {
            let rate = stats.by_status.done as f64 * 100.0 / stats.total as f64;
            stats.completion_rate = rate.round() as u32;
        }
        stats
    }
}
