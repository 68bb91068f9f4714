use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{Priority, Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document {0} not found")]
    NotFound(String),
    #[error("document store error: {0}")]
    Backend(String),
}

/// A document ready to be written; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl NewRecord {
    pub fn into_task(self, id: String) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            priority: self.priority,
            status: self.status,
            attachments: self.attachments,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            user_id: self.user_id,
        }
    }
}

/// Field-level merge. `deleted_at: Some(None)` clears the trash marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

impl FieldUpdate {
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(due_date) = self.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(updated_at) = self.updated_at {
            task.updated_at = updated_at;
        }
        if let Some(deleted_at) = self.deleted_at {
            task.deleted_at = deleted_at;
        }
    }
}

/// Boundary to the document database. Only owner equality is queried; every
/// other filter and ordering happens in the caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, record: NewRecord) -> Result<String, StoreError>;
    async fn query_by_owner(&self, user_id: &str) -> Result<Vec<Task>, StoreError>;
    async fn update(&self, id: &str, update: FieldUpdate) -> Result<(), StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// In-process store with a reachability switch.
#[derive(Debug)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Task>>,
    online: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.docs.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("network unreachable".into()))
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, record: NewRecord) -> Result<String, StoreError> {
        self.ensure_online()?;
        let id = Ulid::new().to_string();
        self.docs
            .lock()
            .insert(id.clone(), record.into_task(id.clone()));
        Ok(id)
    }

    async fn query_by_owner(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .docs
            .lock()
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update(&self, id: &str, update: FieldUpdate) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut docs = self.docs.lock();
        let task = docs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply(task);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.docs.lock().remove(id);
        Ok(())
    }
}
