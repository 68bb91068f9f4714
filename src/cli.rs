use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::model::{Priority, TaskStatus};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "zendo",
    version,
    about = "Tasks from plain sentences, kept in sync even when offline.",
    after_help = "Examples:\n  zendo add --smart submit the report by friday 3pm, urgent\n  zendo list --status todo --search report\n  zendo done 01HZX3\n  zendo --json stats\n  zendo mcp --log debug"
)]
pub struct Cli {
    /// Override the data directory (defaults to platform-specific app dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// User whose tasks are read and written (falls back to ZENDO_USER)
    #[arg(long = "user", value_name = "ID", global = true)]
    pub user_id: Option<String>,

    /// Tracing filter (e.g. "info", "debug", or full directives)
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    /// Start offline: changes are queued until `zendo sync` runs online (or set ZENDO_OFFLINE)
    #[arg(long, global = true)]
    pub offline: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Turn a sentence into a structured task without saving it
    Parse(TextArgs),
    /// Create a task
    Add(AddArgs),
    /// List active tasks (default command)
    List(ListArgs),
    /// List tasks in the trash
    Trash,
    /// Mark a task as done
    Done(IdArgs),
    /// Change fields of an existing task
    Update(UpdateArgs),
    /// Move a task to the trash
    Delete(IdArgs),
    /// Bring a task back from the trash
    Restore(IdArgs),
    /// Permanently delete a task
    Purge(IdArgs),
    /// Show task statistics
    Stats,
    /// Show what happened on this day in history
    History,
    /// Replay mutations saved while offline
    Sync(SyncArgs),
    /// Show pending and failed offline mutations
    Queue,
    /// Run the Model Context Protocol server over stdio
    Mcp,
}

#[derive(Args, Debug, Clone)]
pub struct TextArgs {
    #[arg(value_name = "TEXT", required = true)]
    pub text: Vec<String>,
}

impl TextArgs {
    pub fn joined(&self) -> String {
        self.text.join(" ")
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task title, or a full sentence when --smart is set
    #[arg(value_name = "TEXT", required = true)]
    pub text: Vec<String>,

    /// Let the language model fill in title, due date and priority
    #[arg(long)]
    pub smart: bool,

    #[arg(long)]
    pub description: Option<String>,

    /// Due date (YYYY-MM-DD or RFC 3339)
    #[arg(long = "due", value_name = "DATE")]
    pub due_date: Option<String>,

    /// Due time (HH:mm), combined with --due
    #[arg(long = "time", value_name = "HH:MM", requires = "due_date")]
    pub due_time: Option<String>,

    #[arg(long, value_enum)]
    pub priority: Option<Priority>,

    #[arg(long, value_enum)]
    pub status: Option<TaskStatus>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long, value_enum)]
    pub status: Option<TaskStatus>,

    #[arg(long, value_enum)]
    pub priority: Option<Priority>,

    /// Case-insensitive text match on title and description
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long = "due", value_name = "DATE")]
    pub due_date: Option<String>,

    #[arg(long = "time", value_name = "HH:MM", requires = "due_date")]
    pub due_time: Option<String>,

    #[arg(long, value_enum)]
    pub priority: Option<Priority>,

    #[arg(long, value_enum)]
    pub status: Option<TaskStatus>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Forget mutations that exhausted their retries
    #[arg(long)]
    pub clear_failed: bool,
}
