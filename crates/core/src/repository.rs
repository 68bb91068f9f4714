use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::{CaptureError, TaskDraft, TaskPatch};
use crate::clock::Clock;
use crate::model::Task;
use crate::store::{DocumentStore, FieldUpdate, NewRecord, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{0}")]
    Invalid(#[from] CaptureError),
    #[error("Failed to create task")]
    Create(#[source] StoreError),
    #[error("Failed to fetch tasks")]
    List(#[source] StoreError),
    #[error("Failed to fetch deleted tasks")]
    ListDeleted(#[source] StoreError),
    #[error("Failed to update task")]
    Update(#[source] StoreError),
    #[error("Failed to delete task")]
    Delete(#[source] StoreError),
    #[error("Failed to restore task")]
    Restore(#[source] StoreError),
    #[error("Failed to permanently delete task")]
    PermanentDelete(#[source] StoreError),
}

impl RepositoryError {
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            RepositoryError::Invalid(_) => None,
            RepositoryError::Create(err)
            | RepositoryError::List(err)
            | RepositoryError::ListDeleted(err)
            | RepositoryError::Update(err)
            | RepositoryError::Delete(err)
            | RepositoryError::Restore(err)
            | RepositoryError::PermanentDelete(err) => Some(err),
        }
    }

    /// Only a lost connection is worth replaying later.
    pub fn is_transient(&self) -> bool {
        matches!(self.store_error(), Some(StoreError::Unavailable(_)))
    }
}

/// Task operations as seen by the cache layer and the offline queue.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn create(&self, user_id: &str, draft: TaskDraft) -> Result<String, RepositoryError>;
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, RepositoryError>;
    async fn list_deleted(&self, user_id: &str) -> Result<Vec<Task>, RepositoryError>;
    async fn update(&self, id: &str, patch: TaskPatch) -> Result<(), RepositoryError>;
    async fn soft_delete(&self, id: &str) -> Result<(), RepositoryError>;
    async fn restore(&self, id: &str) -> Result<(), RepositoryError>;
    async fn permanently_delete(&self, id: &str) -> Result<(), RepositoryError>;
}

pub struct TaskRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl TaskRepository {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn fetch_owned(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        self.store.query_by_owner(user_id).await.map_err(|err| {
            tracing::error!(user_id, error = %err, "fetching tasks failed");
            err
        })
    }
}

fn logged<'a>(op: &'static str, id: &'a str) -> impl FnOnce(StoreError) -> StoreError + 'a {
    move |err| {
        tracing::error!(task_id = id, op, error = %err, "store operation failed");
        err
    }
}

#[async_trait]
impl TaskApi for TaskRepository {
    async fn create(&self, user_id: &str, draft: TaskDraft) -> Result<String, RepositoryError> {
        let draft = draft.validate()?;
        let now = self.clock.now();
        let record = NewRecord {
            user_id: user_id.to_string(),
            title: draft.title,
            description: draft.description,
            due_date: draft.due_date,
            priority: draft.priority,
            status: draft.status,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let id = self
            .store
            .insert(record)
            .await
            .map_err(logged("create", user_id))
            .map_err(RepositoryError::Create)?;
        tracing::debug!(task_id = id.as_str(), user_id, "task created");
        Ok(id)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Task>, RepositoryError> {
        let mut tasks: Vec<Task> = self
            .fetch_owned(user_id)
            .await
            .map_err(RepositoryError::List)?
            .into_iter()
            .filter(|task| !task.is_trashed())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn list_deleted(&self, user_id: &str) -> Result<Vec<Task>, RepositoryError> {
        let mut tasks: Vec<Task> = self
            .fetch_owned(user_id)
            .await
            .map_err(RepositoryError::ListDeleted)?
            .into_iter()
            .filter(Task::is_trashed)
            .collect();
        tasks.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(tasks)
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<(), RepositoryError> {
        let patch = patch.validate()?;
        let update = FieldUpdate {
            title: patch.title,
            description: patch.description,
            due_date: patch.due_date,
            priority: patch.priority,
            status: patch.status,
            updated_at: Some(self.clock.now()),
            deleted_at: None,
        };
        self.store
            .update(id, update)
            .await
            .map_err(logged("update", id))
            .map_err(RepositoryError::Update)
    }

    async fn soft_delete(&self, id: &str) -> Result<(), RepositoryError> {
        let now = self.clock.now();
        let update = FieldUpdate {
            updated_at: Some(now),
            deleted_at: Some(Some(now)),
            ..FieldUpdate::default()
        };
        self.store
            .update(id, update)
            .await
            .map_err(logged("soft_delete", id))
            .map_err(RepositoryError::Delete)
    }

    async fn restore(&self, id: &str) -> Result<(), RepositoryError> {
        let update = FieldUpdate {
            updated_at: Some(self.clock.now()),
            deleted_at: Some(None),
            ..FieldUpdate::default()
        };
        self.store
            .update(id, update)
            .await
            .map_err(logged("restore", id))
            .map_err(RepositoryError::Restore)
    }

    async fn permanently_delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.store
            .delete(id)
            .await
            .map_err(logged("permanently_delete", id))
            .map_err(RepositoryError::PermanentDelete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{Priority, TaskStatus};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::error::Error as _;

    fn setup() -> (TaskRepository, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let repo = TaskRepository::new(store.clone(), clock.clone());
        (repo, store, clock)
    }

    #[tokio::test]
    async fn create_assigns_server_fields() {
        let (repo, store, clock) = setup();
        let draft = TaskDraft {
            title: "  Ship it  ".into(),
            priority: Priority::High,
            ..TaskDraft::default()
        };
        let id = repo.create("alice", draft).await.unwrap();

        let task = store.get(&id).unwrap();
        assert_eq!(task.title, "Ship it");
        assert_eq!(task.user_id, "alice");
        assert_eq!(task.attachments, Vec::<String>::new());
        assert_eq!(task.deleted_at, None);
        assert_eq!(task.created_at, clock.now());
        assert_eq!(task.updated_at, clock.now());
    }

    #[tokio::test]
    async fn create_rejects_invalid_draft_before_store_call() {
        let (repo, store, _clock) = setup();
        let err = repo.create("alice", TaskDraft::new("   ")).await.unwrap_err();
        assert_eq!(err, RepositoryError::Invalid(CaptureError::EmptyTitle));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_and_list_deleted_partition_owned_records() {
        let (repo, _store, clock) = setup();
        let mut ids = Vec::new();
        for title in ["one", "two", "three", "four"] {
            ids.push(repo.create("alice", TaskDraft::new(title)).await.unwrap());
            clock.advance(Duration::minutes(1));
        }
        repo.create("bob", TaskDraft::new("not mine")).await.unwrap();

        repo.soft_delete(&ids[0]).await.unwrap();
        clock.advance(Duration::minutes(1));
        repo.soft_delete(&ids[2]).await.unwrap();

        let active = repo.list("alice").await.unwrap();
        let trashed = repo.list_deleted("alice").await.unwrap();

        assert!(active.iter().all(|t| t.deleted_at.is_none()));
        assert!(trashed.iter().all(|t| t.deleted_at.is_some()));

        assert_eq!(
            active.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
            vec!["four", "two"]
        );
        assert_eq!(
            trashed.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
            vec!["three", "one"]
        );

        let union: BTreeSet<_> = active.iter().chain(trashed.iter()).map(|t| t.id.clone()).collect();
        let all: BTreeSet<_> = ids.into_iter().collect();
        assert_eq!(union, all);
    }

    #[tokio::test]
    async fn update_refreshes_updated_at_and_restore_clears_marker() {
        let (repo, store, clock) = setup();
        let id = repo.create("alice", TaskDraft::new("Draft")).await.unwrap();

        clock.advance(Duration::hours(1));
        repo.update(&id, TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap();
        let task = store.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.updated_at, clock.now());

        repo.soft_delete(&id).await.unwrap();
        assert!(store.get(&id).unwrap().is_trashed());
        clock.advance(Duration::hours(1));
        repo.restore(&id).await.unwrap();
        let task = store.get(&id).unwrap();
        assert!(!task.is_trashed());
        assert_eq!(task.updated_at, clock.now());

        repo.permanently_delete(&id).await.unwrap();
        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn store_failures_are_wrapped_with_operation_message() {
        let (repo, store, _clock) = setup();
        store.set_online(false);

        let err = repo.list("alice").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch tasks");
        assert!(err.is_transient());
        assert!(err.source().is_some());

        store.set_online(true);
        let err = repo.soft_delete("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to delete task");
        assert!(!err.is_transient());
    }
}
