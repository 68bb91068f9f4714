use std::fmt;
use std::io::Write;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use zendo_core::capture::{parse_due, TaskDraft, TaskPatch};
use zendo_core::history::HistoryResponse;
use zendo_core::model::{Task, TaskFilters, TaskStatus};
use zendo_core::services::{DrainOutcome, MutationOutcome, SkipReason};
use zendo_core::stats::TaskStats;
use zendo_core::{App, ParseResponse};

use crate::cli::{AddArgs, CliCommand, ListArgs, SyncArgs, UpdateArgs};

const NO_USER: &str = "No user configured; pass --user or set ZENDO_USER";

pub async fn execute<W: Write>(
    app: &App,
    command: CliCommand,
    json: bool,
    mut writer: W,
) -> Result<()> {
    let out = Output { json };
    match command {
        CliCommand::Parse(args) => {
            let response = app.parser().parse(&args.joined()).await;
            out.emit(&mut writer, &response, |w| write_parse(w, &response))
        }
        CliCommand::Add(args) => {
            let draft = build_draft(app, args).await?;
            let outcome = app.tasks().create(draft).await?;
            out.emit(&mut writer, &outcome, |w| {
                writeln!(w, "{}", OutcomeLine::new("Created", &outcome))
            })
        }
        CliCommand::List(args) => {
            let tasks = app
                .tasks()
                .list(filters_from(args))
                .await?
                .ok_or_else(|| anyhow!(NO_USER))?;
            out.emit(&mut writer, &tasks, |w| write_tasks(w, &tasks, "No tasks"))
        }
        CliCommand::Trash => {
            let tasks = app
                .tasks()
                .list_deleted()
                .await?
                .ok_or_else(|| anyhow!(NO_USER))?;
            out.emit(&mut writer, &tasks, |w| write_tasks(w, &tasks, "Trash is empty"))
        }
        CliCommand::Done(args) => {
            let outcome = app
                .tasks()
                .update(&args.id, TaskPatch::status(TaskStatus::Done))
                .await?;
            out.emit(&mut writer, &outcome, |w| {
                writeln!(w, "{}", OutcomeLine::new("Completed", &outcome))
            })
        }
        CliCommand::Update(args) => {
            let (id, patch) = build_patch(args)?;
            let outcome = app.tasks().update(&id, patch).await?;
            out.emit(&mut writer, &outcome, |w| {
                writeln!(w, "{}", OutcomeLine::new("Updated", &outcome))
            })
        }
        CliCommand::Delete(args) => {
            let outcome = app.tasks().delete(&args.id).await?;
            out.emit(&mut writer, &outcome, |w| {
                writeln!(w, "{}", OutcomeLine::new("Moved to trash", &outcome))
            })
        }
        CliCommand::Restore(args) => {
            let outcome = app.tasks().restore(&args.id).await?;
            out.emit(&mut writer, &outcome, |w| {
                writeln!(w, "{}", OutcomeLine::new("Restored", &outcome))
            })
        }
        CliCommand::Purge(args) => {
            let outcome = app.tasks().permanently_delete(&args.id).await?;
            out.emit(&mut writer, &outcome, |w| {
                writeln!(w, "{}", OutcomeLine::new("Permanently deleted", &outcome))
            })
        }
        CliCommand::Stats => {
            let stats = app.tasks().stats().await?.ok_or_else(|| anyhow!(NO_USER))?;
            out.emit(&mut writer, &stats, |w| write_stats(w, &stats))
        }
        CliCommand::History => {
            let response = app.history().today().await;
            out.emit(&mut writer, &response, |w| write_history(w, &response))
        }
        CliCommand::Sync(args) => handle_sync(app, args, out, &mut writer).await,
        CliCommand::Queue => {
            let queue = app.tasks().queue();
            let report = QueueReport {
                pending: queue.pending().await,
                failed: queue.failed().await.context("Failed to read dead letters")?,
            };
            out.emit(&mut writer, &report, |w| report.write_to(w))
        }
        CliCommand::Mcp => Err(anyhow!("launch the MCP server directly")),
    }
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn emit<W, T, F>(&self, writer: &mut W, value: &T, human: F) -> Result<()>
    where
        W: Write,
        T: Serialize,
        F: FnOnce(&mut W) -> std::io::Result<()>,
    {
        if self.json {
            serde_json::to_writer_pretty(&mut *writer, value)?;
            writeln!(writer)?;
        } else {
            human(writer)?;
        }
        Ok(())
    }
}

/// `--smart` seeds the draft from the parser; explicit flags still win.
async fn build_draft(app: &App, args: AddArgs) -> Result<TaskDraft> {
    let text = args.text.join(" ");
    let mut draft = if args.smart {
        let response = app.parser().parse(&text).await;
        match response.data {
            Some(parsed) => TaskDraft::from_parsed(&parsed),
            None => {
                tracing::warn!(
                    error = response.error.as_deref().unwrap_or_default(),
                    "smart add fell back to the raw text"
                );
                TaskDraft::new(text)
            }
        }
    } else {
        TaskDraft::new(text)
    };

    if let Some(description) = args.description {
        draft.description = Some(description);
    }
    if let Some(due) = args.due_date.as_deref() {
        draft.due_date = Some(parse_due(due, args.due_time.as_deref())?);
    }
    if let Some(priority) = args.priority {
        draft.priority = priority;
    }
    if let Some(status) = args.status {
        draft.status = status;
    }
    Ok(draft)
}

fn build_patch(args: UpdateArgs) -> Result<(String, TaskPatch)> {
    let patch = TaskPatch {
        title: args.title,
        description: args.description,
        due_date: args
            .due_date
            .as_deref()
            .map(|raw| parse_due(raw, args.due_time.as_deref()))
            .transpose()?,
        priority: args.priority,
        status: args.status,
    };
    if patch.is_empty() {
        bail!("Nothing to update; pass at least one of --title, --description, --due, --priority, --status");
    }
    Ok((args.id, patch))
}

fn filters_from(args: ListArgs) -> TaskFilters {
    TaskFilters {
        status: args.status,
        priority: args.priority,
        search: args
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

async fn handle_sync<W: Write>(app: &App, args: SyncArgs, out: Output, writer: &mut W) -> Result<()> {
    let outcome = app.tasks().sync().await;
    if args.clear_failed {
        app.tasks()
            .queue()
            .clear_failed()
            .await
            .context("Failed to clear dead letters")?;
    }
    out.emit(writer, &outcome, |w| writeln!(w, "{}", SyncLine(&outcome)))
}

enum OutcomeLine<'a> {
    Done(&'a str, Option<&'a str>),
    Queued(&'a str),
}

impl<'a> OutcomeLine<'a> {
    fn new(verb: &'a str, outcome: &'a MutationOutcome) -> Self {
        match outcome {
            MutationOutcome::Applied => OutcomeLine::Done(verb, None),
            MutationOutcome::Created(id) => OutcomeLine::Done(verb, Some(id)),
            MutationOutcome::Queued(id) => OutcomeLine::Queued(id),
        }
    }
}

impl fmt::Display for OutcomeLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeLine::Done(verb, Some(id)) => write!(f, "{} task {}", verb, id),
            OutcomeLine::Done(verb, None) => write!(f, "{}", verb),
            OutcomeLine::Queued(id) => write!(
                f,
                "Saved offline as {}; it will sync when the connection returns",
                id
            ),
        }
    }
}

struct SyncLine<'a>(&'a DrainOutcome);

impl fmt::Display for SyncLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            DrainOutcome::Skipped { reason } => match reason {
                SkipReason::Offline => write!(f, "Offline; nothing synced"),
                SkipReason::AlreadyRunning => write!(f, "A sync is already running"),
                SkipReason::Empty => write!(f, "Nothing to sync"),
            },
            DrainOutcome::Completed(report) => write!(
                f,
                "Synced {}, retrying {}, dropped {}",
                report.succeeded.len(),
                report.retried.len(),
                report.dropped.len()
            ),
        }
    }
}

struct TaskLine<'a>(&'a Task);

impl fmt::Display for TaskLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = self.0;
        write!(
            f,
            "{}  [{:<11}] {:<6} {}",
            task.id,
            task.status.as_str(),
            task.priority.as_str(),
            task.title
        )?;
        if let Some(due) = task.due_date {
            write!(f, "  due {}", due.format("%Y-%m-%d %H:%M"))?;
        }
        Ok(())
    }
}

fn write_tasks<W: Write>(writer: &mut W, tasks: &[Task], empty: &str) -> std::io::Result<()> {
    if tasks.is_empty() {
        return writeln!(writer, "{}", empty);
    }
    for task in tasks {
        writeln!(writer, "{}", TaskLine(task))?;
    }
    Ok(())
}

fn write_parse<W: Write>(writer: &mut W, response: &ParseResponse) -> std::io::Result<()> {
    let Some(task) = &response.data else {
        return writeln!(
            writer,
            "Could not parse: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    };
    writeln!(writer, "Title:      {}", task.title)?;
    if let Some(description) = &task.description {
        writeln!(writer, "Notes:      {}", description)?;
    }
    if let Some(date) = &task.due_date {
        match &task.due_time {
            Some(time) => writeln!(writer, "Due:        {} {}", date, time)?,
            None => writeln!(writer, "Due:        {}", date)?,
        }
    }
    writeln!(writer, "Priority:   {}", task.priority)?;
    writeln!(writer, "Confidence: {:.0}%", task.confidence * 100.0)
}

fn write_stats<W: Write>(writer: &mut W, stats: &TaskStats) -> std::io::Result<()> {
    writeln!(writer, "Total:       {}", stats.total)?;
    writeln!(
        writer,
        "By status:   todo {}, in-progress {}, done {}, archived {}",
        stats.by_status.todo,
        stats.by_status.in_progress,
        stats.by_status.done,
        stats.by_status.archived
    )?;
    writeln!(
        writer,
        "By priority: low {}, medium {}, high {}, urgent {}",
        stats.by_priority.low,
        stats.by_priority.medium,
        stats.by_priority.high,
        stats.by_priority.urgent
    )?;
    writeln!(writer, "Overdue:     {}", stats.overdue)?;
    writeln!(writer, "Completed:   {}%", stats.completion_rate)?;
    writeln!(
        writer,
        "Last 7 days: {} created, {} completed",
        stats.created_last_7_days, stats.completed_last_7_days
    )
}

fn write_history<W: Write>(writer: &mut W, response: &HistoryResponse) -> std::io::Result<()> {
    writeln!(writer, "On {}:", response.date)?;
    for event in &response.events {
        writeln!(writer, "  {}  {}", event.year, event.title)?;
        writeln!(writer, "        {}", event.description)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct QueueReport {
    pending: Vec<zendo_core::services::QueuedMutation>,
    failed: Vec<zendo_core::services::QueuedMutation>,
}

impl QueueReport {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        if self.pending.is_empty() && self.failed.is_empty() {
            return writeln!(writer, "Offline queue is empty");
        }
        for (label, items) in [("pending", &self.pending), ("failed", &self.failed)] {
            for item in items {
                writeln!(
                    writer,
                    "{:<8} {}  {:<16} retries {}",
                    label,
                    item.id,
                    item.kind.as_str(),
                    item.retry_count
                )?;
            }
        }
        Ok(())
    }
}
