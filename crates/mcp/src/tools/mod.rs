mod create;
mod delete;
mod insights;
mod list;
mod parse;
mod sync;
mod update;
mod util;

use std::sync::Arc;

use pmcp::ServerBuilder;
use zendo_core::App;

pub const NAMES: [&str; 11] = [
    "parse_task",
    "create_task",
    "list_tasks",
    "list_trash",
    "update_task",
    "delete_task",
    "restore_task",
    "purge_task",
    "task_stats",
    "today_in_history",
    "sync_queue",
];

pub fn register(builder: ServerBuilder, app: Arc<App>) -> ServerBuilder {
    builder
        .tool("parse_task", parse::ParseTaskTool::new(app.clone()))
        .tool("create_task", create::CreateTaskTool::new(app.clone()))
        .tool("list_tasks", list::ListTasksTool::new(app.clone()))
        .tool("list_trash", list::ListTrashTool::new(app.clone()))
        .tool("update_task", update::UpdateTaskTool::new(app.clone()))
        .tool(
            "delete_task",
            delete::TaskActionTool::new(app.clone(), delete::TaskAction::Delete),
        )
        .tool(
            "restore_task",
            delete::TaskActionTool::new(app.clone(), delete::TaskAction::Restore),
        )
        .tool(
            "purge_task",
            delete::TaskActionTool::new(app.clone(), delete::TaskAction::Purge),
        )
        .tool("task_stats", insights::TaskStatsTool::new(app.clone()))
        .tool(
            "today_in_history",
            insights::TodayInHistoryTool::new(app.clone()),
        )
        .tool("sync_queue", sync::SyncQueueTool::new(app))
}
