//! Durable FIFO of mutations that could not reach the store.
//!
//! The whole queue is persisted on every change. A drain replays a snapshot of
//! the queue in order; at most one drain runs at a time. Items that fail
//! [`MAX_RETRIES`] times are moved to a dead-letter list.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::capture::{TaskDraft, TaskPatch};
use crate::clock::Clock;
use crate::connectivity::Connectivity;
use crate::notify::{Notice, Notifier};
use crate::repository::{RepositoryError, TaskApi};
use crate::services::cache::{KeyScope, QueryCache};

pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationType {
    Create,
    Update,
    Delete,
    Restore,
    PermanentDelete,
}

impl MutationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationType::Create => "CREATE",
            MutationType::Update => "UPDATE",
            MutationType::Delete => "DELETE",
            MutationType::Restore => "RESTORE",
            MutationType::PermanentDelete => "PERMANENT_DELETE",
        }
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored payload; which shape applies is decided by [`MutationType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MutationData {
    #[serde(rename_all = "camelCase")]
    Create { user_id: String, task_data: TaskDraft },
    Update { id: String, updates: TaskPatch },
    Target { id: String },
}

/// A mutation as the service issues it.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create { user_id: String, draft: TaskDraft },
    Update { id: String, patch: TaskPatch },
    Delete { id: String },
    Restore { id: String },
    PermanentDelete { id: String },
}

impl Mutation {
    pub async fn apply(&self, api: &dyn TaskApi) -> Result<(), RepositoryError> {
        match self {
            Mutation::Create { user_id, draft } => {
                api.create(user_id, draft.clone()).await?;
            }
            Mutation::Update { id, patch } => api.update(id, patch.clone()).await?,
            Mutation::Delete { id } => api.soft_delete(id).await?,
            Mutation::Restore { id } => api.restore(id).await?,
            Mutation::PermanentDelete { id } => api.permanently_delete(id).await?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MutationType,
    pub data: MutationData,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub retry_count: u32,
}

impl QueuedMutation {
    pub fn new(mutation: Mutation, timestamp: i64) -> Self {
        let (kind, data) = match mutation {
            Mutation::Create { user_id, draft } => (
                MutationType::Create,
                MutationData::Create {
                    user_id,
                    task_data: draft,
                },
            ),
            Mutation::Update { id, patch } => (
                MutationType::Update,
                MutationData::Update { id, updates: patch },
            ),
            Mutation::Delete { id } => (MutationType::Delete, MutationData::Target { id }),
            Mutation::Restore { id } => (MutationType::Restore, MutationData::Target { id }),
            Mutation::PermanentDelete { id } => {
                (MutationType::PermanentDelete, MutationData::Target { id })
            }
        };
        Self {
            id: Ulid::new().to_string(),
            kind,
            data,
            timestamp,
            retry_count: 0,
        }
    }

    pub fn mutation(&self) -> Result<Mutation, ReplayError> {
        let mutation = match (self.kind, &self.data) {
            (MutationType::Create, MutationData::Create { user_id, task_data }) => {
                Mutation::Create {
                    user_id: user_id.clone(),
                    draft: task_data.clone(),
                }
            }
            (MutationType::Update, MutationData::Update { id, updates }) => Mutation::Update {
                id: id.clone(),
                patch: updates.clone(),
            },
            (MutationType::Delete, data) => Mutation::Delete {
                id: target_id(self, data)?,
            },
            (MutationType::Restore, data) => Mutation::Restore {
                id: target_id(self, data)?,
            },
            (MutationType::PermanentDelete, data) => Mutation::PermanentDelete {
                id: target_id(self, data)?,
            },
            _ => return Err(self.mismatch()),
        };
        Ok(mutation)
    }

    fn mismatch(&self) -> ReplayError {
        ReplayError::Mismatch {
            id: self.id.clone(),
            kind: self.kind,
        }
    }
}

fn target_id(item: &QueuedMutation, data: &MutationData) -> Result<String, ReplayError> {
    match data {
        MutationData::Target { id } => Ok(id.clone()),
        _ => Err(item.mismatch()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("queued mutation {id} carries data that does not match type {kind}")]
    Mismatch { id: String, kind: MutationType },
}

#[derive(Debug, Error)]
pub enum QueueStorageError {
    #[error("failed to access queue file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode or decode queue: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Whole-array persistence for a list of queued mutations.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    async fn load(&self) -> Result<Vec<QueuedMutation>, QueueStorageError>;
    async fn save(&self, items: &[QueuedMutation]) -> Result<(), QueueStorageError>;
}

/// JSON array in a single file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileQueueStorage {
    path: PathBuf,
}

impl FileQueueStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The dead-letter file that sits next to a queue file.
    pub fn dead_letters_for(queue_path: &Path) -> Self {
        let stem = queue_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("offline-queue");
        Self::new(queue_path.with_file_name(format!("{}.failed.json", stem)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> QueueStorageError {
        QueueStorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl QueueStorage for FileQueueStorage {
    async fn load(&self) -> Result<Vec<QueuedMutation>, QueueStorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(self.io_error(err)),
        }
    }

    async fn save(&self, items: &[QueuedMutation]) -> Result<(), QueueStorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        let payload = serde_json::to_vec_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))
    }
}

#[derive(Debug, Default)]
pub struct MemoryQueueStorage {
    items: parking_lot::Mutex<Vec<QueuedMutation>>,
}

impl MemoryQueueStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<QueuedMutation> {
        self.items.lock().clone()
    }
}

#[async_trait]
impl QueueStorage for MemoryQueueStorage {
    async fn load(&self) -> Result<Vec<QueuedMutation>, QueueStorageError> {
        Ok(self.items.lock().clone())
    }

    async fn save(&self, items: &[QueuedMutation]) -> Result<(), QueueStorageError> {
        *self.items.lock() = items.to_vec();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub succeeded: Vec<String>,
    pub retried: Vec<String>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DrainOutcome {
    Skipped { reason: SkipReason },
    Completed(DrainReport),
}

struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct OfflineQueue {
    items: Mutex<Vec<QueuedMutation>>,
    storage: Arc<dyn QueueStorage>,
    dead_letters: Arc<dyn QueueStorage>,
    draining: AtomicBool,
    api: Arc<dyn TaskApi>,
    cache: Arc<QueryCache>,
    connectivity: Connectivity,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

/// Collaborators of an [`OfflineQueue`].
pub struct QueueDeps {
    pub api: Arc<dyn TaskApi>,
    pub cache: Arc<QueryCache>,
    pub connectivity: Connectivity,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl OfflineQueue {
    /// Loads persisted items. An unreadable queue starts empty.
    pub async fn open(
        storage: Arc<dyn QueueStorage>,
        dead_letters: Arc<dyn QueueStorage>,
        deps: QueueDeps,
    ) -> Arc<Self> {
        let items = match storage.load().await {
            Ok(items) => items,
            Err(err) => {
                tracing::error!(error = %err, "failed to load offline queue");
                Vec::new()
            }
        };
        if !items.is_empty() {
            tracing::info!(count = items.len(), "loaded queued mutations");
        }
        Arc::new(Self {
            items: Mutex::new(items),
            storage,
            dead_letters,
            draining: AtomicBool::new(false),
            api: deps.api,
            cache: deps.cache,
            connectivity: deps.connectivity,
            notifier: deps.notifier,
            clock: deps.clock,
        })
    }

    /// Appends and persists a mutation, then starts a background drain when
    /// online. The mutation stays queued in memory even if persisting fails.
    pub async fn enqueue(self: &Arc<Self>, mutation: Mutation) -> Result<String, QueueStorageError> {
        let item = QueuedMutation::new(mutation, self.clock.now().timestamp_millis());
        let id = item.id.clone();
        tracing::info!(mutation_id = id.as_str(), kind = %item.kind, "queued mutation");

        let saved = {
            let mut items = self.items.lock().await;
            items.push(item);
            self.storage.save(&items).await
        };

        if self.connectivity.is_online() {
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                queue.drain().await;
            });
        }

        saved.map(|_| id)
    }

    pub async fn drain(&self) -> DrainOutcome {
        if !self.connectivity.is_online() {
            return DrainOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("drain already running");
            return DrainOutcome::Skipped {
                reason: SkipReason::AlreadyRunning,
            };
        };

        let batch = self.items.lock().await.clone();
        if batch.is_empty() {
            return DrainOutcome::Skipped {
                reason: SkipReason::Empty,
            };
        }

        let mut report = DrainReport::default();
        let mut retry_counts: HashMap<String, u32> = HashMap::new();
        let mut dropped_items = Vec::new();

        for mut item in batch {
            match self.replay(&item).await {
                Ok(()) => {
                    tracing::info!(mutation_id = item.id.as_str(), "replayed queued mutation");
                    report.succeeded.push(item.id);
                }
                Err(err) => {
                    item.retry_count += 1;
                    tracing::warn!(
                        mutation_id = item.id.as_str(),
                        attempt = item.retry_count,
                        error = %err,
                        "queued mutation failed"
                    );
                    if item.retry_count >= MAX_RETRIES {
                        tracing::warn!(
                            mutation_id = item.id.as_str(),
                            "dropping mutation after {} failed attempts",
                            MAX_RETRIES
                        );
                        report.dropped.push(item.id.clone());
                        dropped_items.push(item);
                    } else {
                        retry_counts.insert(item.id.clone(), item.retry_count);
                        report.retried.push(item.id);
                    }
                }
            }
        }

        let removed: HashSet<&str> = report
            .succeeded
            .iter()
            .chain(report.dropped.iter())
            .map(String::as_str)
            .collect();
        {
            let mut items = self.items.lock().await;
            items.retain(|item| !removed.contains(item.id.as_str()));
            for item in items.iter_mut() {
                if let Some(count) = retry_counts.get(&item.id) {
                    item.retry_count = *count;
                }
            }
            if let Err(err) = self.storage.save(&items).await {
                tracing::error!(error = %err, "failed to persist offline queue");
            }
        }

        if !dropped_items.is_empty() {
            self.record_dead_letters(dropped_items).await;
        }
        if !removed.is_empty() {
            self.cache.invalidate(&KeyScope::All);
        }

        DrainOutcome::Completed(report)
    }

    /// Drains whenever connectivity flips back to online. The task ends once
    /// the queue is dropped.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.connectivity.subscribe();
        let queue: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if !online {
                    continue;
                }
                let Some(queue) = queue.upgrade() else {
                    break;
                };
                tracing::info!("back online, processing queued mutations");
                queue.drain().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn pending(&self) -> Vec<QueuedMutation> {
        self.items.lock().await.clone()
    }

    pub async fn failed(&self) -> Result<Vec<QueuedMutation>, QueueStorageError> {
        self.dead_letters.load().await
    }

    pub async fn clear(&self) -> Result<(), QueueStorageError> {
        let mut items = self.items.lock().await;
        items.clear();
        self.storage.save(&items).await
    }

    pub async fn clear_failed(&self) -> Result<(), QueueStorageError> {
        self.dead_letters.save(&[]).await
    }

    async fn replay(&self, item: &QueuedMutation) -> Result<(), ReplayError> {
        item.mutation()?.apply(self.api.as_ref()).await?;
        Ok(())
    }

    async fn record_dead_letters(&self, dropped: Vec<QueuedMutation>) {
        let count = dropped.len();
        let mut failed = match self.dead_letters.load().await {
            Ok(failed) => failed,
            Err(err) => {
                tracing::error!(error = %err, "failed to load dead-letter list");
                Vec::new()
            }
        };
        failed.extend(dropped);
        if let Err(err) = self.dead_letters.save(&failed).await {
            tracing::error!(error = %err, "failed to persist dead-letter list");
        }
        self.notifier.notify(Notice::warning(
            "Sync failed",
            format!(
                "{} change(s) could not be synced after {} attempts",
                count, MAX_RETRIES
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{Priority, Task, TaskFilters};
    use crate::notify::{NoticeLevel, RecordingNotifier};
    use crate::services::cache::QueryKey;
    use crate::store::StoreError;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    /// Records every call and fails the ids listed in `failing`.
    #[derive(Default)]
    struct ScriptedApi {
        calls: parking_lot::Mutex<Vec<String>>,
        failing: parking_lot::Mutex<HashSet<String>>,
        gate: Option<Arc<tokio::sync::Notify>>,
    }

    impl ScriptedApi {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: parking_lot::Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        async fn record(&self, call: String, id: &str) -> Result<(), StoreError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.calls.lock().push(call);
            if self.failing.lock().contains(id) {
                Err(StoreError::Unavailable("still down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TaskApi for ScriptedApi {
        async fn create(&self, user_id: &str, draft: TaskDraft) -> Result<String, RepositoryError> {
            self.record(format!("create:{}:{}", user_id, draft.title), &draft.title)
                .await
                .map_err(RepositoryError::Create)?;
            Ok("new-id".into())
        }

        async fn list(&self, _user_id: &str) -> Result<Vec<Task>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn list_deleted(&self, _user_id: &str) -> Result<Vec<Task>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn update(&self, id: &str, _patch: TaskPatch) -> Result<(), RepositoryError> {
            self.record(format!("update:{}", id), id)
                .await
                .map_err(RepositoryError::Update)
        }

        async fn soft_delete(&self, id: &str) -> Result<(), RepositoryError> {
            self.record(format!("delete:{}", id), id)
                .await
                .map_err(RepositoryError::Delete)
        }

        async fn restore(&self, id: &str) -> Result<(), RepositoryError> {
            self.record(format!("restore:{}", id), id)
                .await
                .map_err(RepositoryError::Restore)
        }

        async fn permanently_delete(&self, id: &str) -> Result<(), RepositoryError> {
            self.record(format!("purge:{}", id), id)
                .await
                .map_err(RepositoryError::PermanentDelete)
        }
    }

    struct Harness {
        queue: Arc<OfflineQueue>,
        api: Arc<ScriptedApi>,
        storage: Arc<MemoryQueueStorage>,
        dead_letters: Arc<MemoryQueueStorage>,
        cache: Arc<QueryCache>,
        connectivity: Connectivity,
        notifier: Arc<RecordingNotifier>,
    }

    async fn harness(api: ScriptedApi, online: bool) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let api = Arc::new(api);
        let storage = Arc::new(MemoryQueueStorage::new());
        let dead_letters = Arc::new(MemoryQueueStorage::new());
        let cache = Arc::new(QueryCache::new(clock.clone()));
        let connectivity = Connectivity::new(online);
        let notifier = Arc::new(RecordingNotifier::new());
        let queue = OfflineQueue::open(
            storage.clone(),
            dead_letters.clone(),
            QueueDeps {
                api: api.clone(),
                cache: cache.clone(),
                connectivity: connectivity.clone(),
                notifier: notifier.clone(),
                clock,
            },
        )
        .await;
        Harness {
            queue,
            api,
            storage,
            dead_letters,
            cache,
            connectivity,
            notifier,
        }
    }

    fn delete(id: &str) -> Mutation {
        Mutation::Delete { id: id.into() }
    }

    #[test]
    fn wire_format_uses_type_and_camel_case() {
        let item = QueuedMutation::new(
            Mutation::Create {
                user_id: "alice".into(),
                draft: TaskDraft {
                    priority: Priority::High,
                    ..TaskDraft::new("Call mom")
                },
            },
            1_700_000_000_000,
        );
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], json!("CREATE"));
        assert_eq!(value["retryCount"], json!(0));
        assert_eq!(value["data"]["userId"], json!("alice"));
        assert_eq!(value["data"]["taskData"]["title"], json!("Call mom"));

        let decoded: QueuedMutation = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, item);

        let purge: QueuedMutation = serde_json::from_value(json!({
            "id": "1-abc",
            "type": "PERMANENT_DELETE",
            "data": { "id": "task-9" },
            "timestamp": 1,
            "retryCount": 2
        }))
        .unwrap();
        assert_eq!(
            purge.mutation().unwrap(),
            Mutation::PermanentDelete { id: "task-9".into() }
        );
    }

    #[test]
    fn mismatched_type_and_data_is_rejected() {
        let item: QueuedMutation = serde_json::from_value(json!({
            "id": "1-abc",
            "type": "UPDATE",
            "data": { "id": "task-9" },
            "timestamp": 1,
            "retryCount": 0
        }))
        .unwrap();
        assert!(matches!(item.mutation(), Err(ReplayError::Mismatch { .. })));
    }

    #[tokio::test]
    async fn drain_is_skipped_while_offline() {
        let h = harness(ScriptedApi::default(), false).await;
        h.queue.enqueue(delete("a")).await.unwrap();
        assert_eq!(h.storage.stored().len(), 1);
        assert_eq!(
            h.queue.drain().await,
            DrainOutcome::Skipped {
                reason: SkipReason::Offline
            }
        );
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn always_failing_mutation_is_dropped_after_exactly_three_drains() {
        let h = harness(ScriptedApi::failing(&["doomed"]), false).await;
        h.queue.enqueue(delete("doomed")).await.unwrap();
        h.connectivity.set_online(true);

        for attempt in 1..MAX_RETRIES {
            let outcome = h.queue.drain().await;
            assert!(matches!(outcome, DrainOutcome::Completed(ref r) if r.retried.len() == 1));
            assert_eq!(h.queue.len().await, 1, "still queued after drain {}", attempt);
            assert_eq!(h.storage.stored()[0].retry_count, attempt);
        }

        let outcome = h.queue.drain().await;
        match outcome {
            DrainOutcome::Completed(report) => assert_eq!(report.dropped.len(), 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(h.queue.is_empty().await);
        assert!(h.storage.stored().is_empty());
        assert_eq!(h.api.calls().len(), 3);

        let failed = h.dead_letters.stored();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].retry_count, MAX_RETRIES);
        let notices = h.notifier.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);

        assert_eq!(
            h.queue.drain().await,
            DrainOutcome::Skipped {
                reason: SkipReason::Empty
            }
        );
    }

    #[tokio::test]
    async fn drain_replays_in_fifo_order_and_keeps_failures() {
        let h = harness(ScriptedApi::failing(&["b"]), false).await;
        h.queue.enqueue(delete("a")).await.unwrap();
        h.queue
            .enqueue(Mutation::Update {
                id: "b".into(),
                patch: TaskPatch::default(),
            })
            .await
            .unwrap();
        h.queue
            .enqueue(Mutation::Restore { id: "c".into() })
            .await
            .unwrap();

        let key = QueryKey::list("alice", TaskFilters::default());
        h.cache.set(key.clone(), Vec::new());

        h.connectivity.set_online(true);
        let outcome = h.queue.drain().await;

        assert_eq!(h.api.calls(), vec!["delete:a", "update:b", "restore:c"]);
        match outcome {
            DrainOutcome::Completed(report) => {
                assert_eq!(report.succeeded.len(), 2);
                assert_eq!(report.retried.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let pending = h.queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationType::Update);
        assert!(!h.cache.is_fresh(&key));
    }

    #[tokio::test]
    async fn concurrent_drain_is_a_no_op() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let api = ScriptedApi {
            gate: Some(gate.clone()),
            ..ScriptedApi::default()
        };
        let h = harness(api, false).await;
        h.queue.enqueue(delete("a")).await.unwrap();
        h.connectivity.set_online(true);

        let first = {
            let queue = h.queue.clone();
            tokio::spawn(async move { queue.drain().await })
        };
        while !h.queue.draining.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            h.queue.drain().await,
            DrainOutcome::Skipped {
                reason: SkipReason::AlreadyRunning
            }
        );

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, DrainOutcome::Completed(ref r) if r.succeeded.len() == 1));
        assert_eq!(h.api.calls(), vec!["delete:a"]);
    }

    #[tokio::test]
    async fn reconnect_signal_triggers_drain() {
        let h = harness(ScriptedApi::default(), false).await;
        h.queue.enqueue(delete("a")).await.unwrap();
        let listener = h.queue.spawn_reconnect_listener();

        h.connectivity.set_online(true);
        for _ in 0..100 {
            if h.queue.is_empty().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(h.queue.is_empty().await);
        assert_eq!(h.api.calls(), vec!["delete:a"]);
        listener.abort();
    }

    #[tokio::test]
    async fn file_storage_survives_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("offline-queue.json");
        let storage = FileQueueStorage::new(&path);

        let first = QueuedMutation::new(delete("a"), 1);
        let second = QueuedMutation::new(
            Mutation::Update {
                id: "b".into(),
                patch: TaskPatch {
                    title: Some("Renamed".into()),
                    ..TaskPatch::default()
                },
            },
            2,
        );
        storage
            .save(&[first.clone(), second.clone()])
            .await
            .unwrap();

        let reopened = FileQueueStorage::new(&path);
        assert_eq!(reopened.load().await.unwrap(), vec![first, second]);

        let dead = FileQueueStorage::dead_letters_for(&path);
        assert_eq!(dead.path(), dir.path().join("offline-queue.failed.json"));
        assert!(dead.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_queue_file_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("offline-queue.json");
        std::fs::write(&path, "not json").unwrap();
        let storage = FileQueueStorage::new(&path);
        assert!(matches!(
            storage.load().await,
            Err(QueueStorageError::Serde(_))
        ));
    }
}
