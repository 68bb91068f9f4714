use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{named_params, types::Value, Connection, ErrorCode, Row, ToSql};
use ulid::Ulid;

use crate::config::AppConfig;
use crate::model::Task;
use crate::store::{DocumentStore, FieldUpdate, NewRecord, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

const TASK_COLUMNS: &str = "id, user_id, title, description, due_date, priority, status, \
     attachments, created_at, updated_at, deleted_at";

/// SQLite-backed document collection holding one row per task.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn initialize(config: &AppConfig) -> Result<Self> {
        let conn = Connection::open(config.db_path()).with_context(|| {
            format!("Failed to open database at {}", config.db_path().display())
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to configure SQLite WAL mode")?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to configure SQLite busy timeout")?;

        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    pub fn insert_task(&self, record: &NewRecord) -> Result<String> {
        let id = Ulid::new().to_string();
        let attachments = serde_json::to_string(&record.attachments)?;
        self.conn.execute(
            "INSERT INTO todos (
                id, user_id, title, description, due_date, priority, status,
                attachments, created_at, updated_at, deleted_at
            ) VALUES (
                :id, :user_id, :title, :description, :due_date, :priority, :status,
                :attachments, :created_at, :updated_at, :deleted_at
            )",
            named_params![
                ":id": &id,
                ":user_id": &record.user_id,
                ":title": &record.title,
                ":description": record.description.as_deref(),
                ":due_date": record.due_date.map(|dt| dt.to_rfc3339()),
                ":priority": record.priority.as_str(),
                ":status": record.status.as_str(),
                ":attachments": attachments,
                ":created_at": record.created_at.to_rfc3339(),
                ":updated_at": record.updated_at.to_rfc3339(),
                ":deleted_at": record.deleted_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(id)
    }

    pub fn fetch_by_owner(&self, user_id: &str) -> Result<Vec<Task>> {
        let sql = format!("SELECT {} FROM todos WHERE user_id = ?", TASK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([user_id])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(self.map_task(row)?);
        }
        Ok(tasks)
    }

    pub fn fetch_task(&self, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM todos WHERE id = ? LIMIT 1", TASK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(self.map_task(row)?))
        } else {
            Ok(None)
        }
    }

    /// Returns `false` when no row matched.
    pub fn update_task(&self, id: &str, update: &FieldUpdate) -> Result<bool> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(title) = &update.title {
            assignments.push("title = ?");
            values.push(Value::from(title.clone()));
        }
        if let Some(description) = &update.description {
            assignments.push("description = ?");
            values.push(Value::from(description.clone()));
        }
        if let Some(due_date) = update.due_date {
            assignments.push("due_date = ?");
            values.push(Value::from(due_date.to_rfc3339()));
        }
        if let Some(priority) = update.priority {
            assignments.push("priority = ?");
            values.push(Value::from(priority.as_str().to_string()));
        }
        if let Some(status) = update.status {
            assignments.push("status = ?");
            values.push(Value::from(status.as_str().to_string()));
        }
        if let Some(updated_at) = update.updated_at {
            assignments.push("updated_at = ?");
            values.push(Value::from(updated_at.to_rfc3339()));
        }
        if let Some(deleted_at) = update.deleted_at {
            assignments.push("deleted_at = ?");
            values.push(match deleted_at {
                Some(dt) => Value::from(dt.to_rfc3339()),
                None => Value::Null,
            });
        }

        if assignments.is_empty() {
            return Ok(self.fetch_task(id)?.is_some());
        }

        let sql = format!("UPDATE todos SET {} WHERE id = ?", assignments.join(", "));
        values.push(Value::from(id.to_string()));
        let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        let affected = self.conn.execute(&sql, &param_refs[..])?;
        Ok(affected > 0)
    }

    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM todos WHERE id = :id", named_params![":id": id])?;
        Ok(affected > 0)
    }

    fn map_task(&self, row: &Row<'_>) -> Result<Task> {
        Ok(Task {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            due_date: parse_datetime(row.get::<_, Option<String>>(4)?),
            priority: row.get::<_, String>(5)?.parse()?,
            status: row.get::<_, String>(6)?.parse()?,
            attachments: parse_string_list(row.get::<_, Option<String>>(7)?),
            created_at: parse_datetime_required(row.get::<_, String>(8)?)?,
            updated_at: parse_datetime_required(row.get::<_, String>(9)?)?,
            deleted_at: parse_datetime(row.get::<_, Option<String>>(10)?),
        })
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE IF NOT EXISTS todos (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                due_date TEXT,
                priority TEXT NOT NULL DEFAULT 'medium',
                status TEXT NOT NULL DEFAULT 'todo',
                attachments TEXT DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_todos_user ON todos(user_id);
            ",
        )?;
        Ok(())
    }
}

fn parse_string_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .unwrap_or_default()
}

fn parse_datetime(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_datetime_required(raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Failed to parse timestamp '{}': {}", raw, e))
}

/// [`DocumentStore`] over one long-lived [`Database`] connection, driven on the
/// blocking pool. A connection that hits an unreachable file is dropped and
/// reopened on the next call.
#[derive(Clone)]
pub struct SqliteStore {
    config: AppConfig,
    db: Arc<Mutex<Option<Database>>>,
}

impl SqliteStore {
    pub fn new(config: AppConfig) -> Result<Self> {
        let db = Database::initialize(&config)?;
        Ok(Self {
            config,
            db: Arc::new(Mutex::new(Some(db))),
        })
    }

    async fn with_database<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let config = self.config.clone();
        let slot = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut slot = slot.lock();
            if !config.db_path().is_file() {
                *slot = None;
            }
            if slot.is_none() {
                let db = Database::initialize(&config).map_err(|err| {
                    tracing::warn!(path = %config.db_path().display(), error = %format!("{:#}", err), "database unreachable");
                    StoreError::Unavailable(format!("{:#}", err))
                })?;
                *slot = Some(db);
            }
            let Some(db) = slot.as_ref() else {
                return Err(StoreError::Unavailable("database not open".into()));
            };
            let result = f(db);
            result.map_err(|err| {
                let err = classify(err);
                if matches!(err, StoreError::Unavailable(_)) {
                    *slot = None;
                }
                err
            })
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("blocking task failed: {}", err)))?
    }
}

/// Busy, locked or unreachable database files are worth retrying; anything
/// else is a hard failure.
fn classify(err: anyhow::Error) -> StoreError {
    let code = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<rusqlite::Error>())
        .and_then(rusqlite::Error::sqlite_error_code);
    match code {
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::ReadOnly,
        ) => StoreError::Unavailable(format!("{:#}", err)),
        _ => StoreError::Backend(format!("{:#}", err)),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, record: NewRecord) -> Result<String, StoreError> {
        self.with_database(move |db| db.insert_task(&record)).await
    }

    async fn query_by_owner(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        let user_id = user_id.to_string();
        self.with_database(move |db| db.fetch_by_owner(&user_id))
            .await
    }

    async fn update(&self, id: &str, update: FieldUpdate) -> Result<(), StoreError> {
        let owned = id.to_string();
        let found = self
            .with_database(move |db| db.update_task(&owned, &update))
            .await?;
        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_database(move |db| db.delete_task(&id))
            .await
            .map(|_| ())
    }
}
