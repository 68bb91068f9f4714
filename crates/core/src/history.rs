//! "On this day" trivia fetched from the completion endpoint and cached per calendar day.
//!
//! Two tiers: an in-process map and one JSON file per key under the cache
//! directory. Entries expire after [`CACHE_TTL_MS`]; a durable hit is promoted
//! into memory. There is no other invalidation.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::Clock;
use crate::llm::{ChatMessage, CompletionClient, CompletionRequest, LlmError};

pub const CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;
pub const HISTORY_TEMPERATURE: f32 = 0.7;
pub const HISTORY_MAX_TOKENS: u32 = 1000;
const MAX_EVENTS: usize = 3;

static JSON_ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Completion(#[from] LlmError),
    #[error("No content received from completion endpoint")]
    EmptyReply,
    #[error("Failed to parse history events as JSON")]
    NotJson,
    #[error("Invalid events format from completion endpoint")]
    InvalidFormat,
    #[error("failed to access day cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode day cache file {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Disk,
}

pub struct DayCache<T> {
    memory: Mutex<HashMap<String, CacheEntry<T>>>,
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl<T> DayCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            dir: dir.into(),
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File-tier failures are logged and treated as a miss.
    pub async fn get(&self, key: &str) -> Option<(T, CacheTier)> {
        let now = self.clock.now().timestamp_millis();

        let in_memory = self
            .memory
            .lock()
            .get(key)
            .filter(|entry| is_fresh(entry.timestamp, now))
            .map(|entry| entry.data.clone());
        if let Some(data) = in_memory {
            tracing::debug!(key, "day cache hit (memory)");
            return Some((data, CacheTier::Memory));
        }

        match self.read_file(key).await {
            Ok(Some(entry)) if is_fresh(entry.timestamp, now) => {
                tracing::debug!(key, "day cache hit (disk)");
                let data = entry.data.clone();
                self.memory.lock().insert(key.to_string(), entry);
                return Some((data, CacheTier::Disk));
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "failed to read day cache file"),
        }

        tracing::debug!(key, "day cache miss");
        None
    }

    /// Writes through to both tiers with a fresh timestamp. The memory tier is
    /// updated even when the file cannot be written.
    pub async fn put(&self, key: &str, data: T) -> Result<(), HistoryError> {
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now().timestamp_millis(),
        };
        let written = self.write_file(key, &entry).await;
        self.memory.lock().insert(key.to_string(), entry);
        written
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    async fn read_file(&self, key: &str) -> Result<Option<CacheEntry<T>>, HistoryError> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(HistoryError::Io { path, source }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| HistoryError::Serde { path, source })
    }

    async fn write_file(&self, key: &str, entry: &CacheEntry<T>) -> Result<(), HistoryError> {
        let path = self.path_for(key);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| HistoryError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let raw = serde_json::to_string_pretty(entry).map_err(|source| HistoryError::Serde {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|source| HistoryError::Io { path, source })
    }
}

fn is_fresh(written_at: i64, now: i64) -> bool {
    now - written_at < CACHE_TTL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub year: String,
    pub title: String,
    pub description: String,
}

impl HistoryEvent {
    fn new(year: &str, title: &str, description: &str) -> Self {
        Self {
            year: year.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        }
    }
}

pub fn default_events() -> Vec<HistoryEvent> {
    vec![
        HistoryEvent::new(
            "1912",
            "Republic of China founded",
            "Sun Yat-sen took office as provisional president in Nanjing, establishing a republic in China.",
        ),
        HistoryEvent::new(
            "1969",
            "Apollo 11 Moon landing",
            "Neil Armstrong became the first person to walk on the Moon.",
        ),
        HistoryEvent::new(
            "1991",
            "The World Wide Web goes public",
            "Tim Berners-Lee published the first website, opening the Web to everyone.",
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub date: String,
    pub events: Vec<HistoryEvent>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn cache_key(date: NaiveDate) -> String {
    date.format("history-%m-%d").to_string()
}

pub struct HistoryService {
    client: Arc<dyn CompletionClient>,
    clock: Arc<dyn Clock>,
    cache: DayCache<Vec<HistoryEvent>>,
}

impl HistoryService {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        clock: Arc<dyn Clock>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        let cache = DayCache::new(cache_dir, clock.clone());
        Self {
            client,
            clock,
            cache,
        }
    }

    /// Always returns a usable payload; failures serve the built-in events.
    pub async fn today(&self) -> HistoryResponse {
        let today = self.clock.today_local();
        let key = cache_key(today);
        let date = today.format("%B %-d").to_string();

        if let Some((events, _tier)) = self.cache.get(&key).await {
            return HistoryResponse {
                success: true,
                date,
                events,
                cached: true,
                error: None,
            };
        }

        match self.fetch(today).await {
            Ok(events) => {
                if let Err(error) = self.cache.put(&key, events.clone()).await {
                    tracing::warn!(%error, "failed to write day cache file");
                }
                HistoryResponse {
                    success: true,
                    date,
                    events,
                    cached: false,
                    error: None,
                }
            }
            Err(error) => {
                tracing::warn!(key = key.as_str(), %error, "falling back to built-in history events");
                HistoryResponse {
                    success: false,
                    date,
                    events: default_events(),
                    cached: false,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    async fn fetch(&self, today: NaiveDate) -> Result<Vec<HistoryEvent>, HistoryError> {
        let request = CompletionRequest {
            messages: vec![ChatMessage::user(build_prompt(today))],
            temperature: HISTORY_TEMPERATURE,
            max_tokens: HISTORY_MAX_TOKENS,
        };
        let content = self
            .client
            .complete(request)
            .await?
            .ok_or(HistoryError::EmptyReply)?;
        parse_events(&content)
    }
}

fn build_prompt(today: NaiveDate) -> String {
    format!(
        r#"List 3 notable historical events that happened on this day ({date}).
Requirements:
1. Each event has a year, a title and a short description (at most 50 words).
2. Prefer influential, widely known events.
3. Spread the events across different eras.
4. Return a JSON array of 3 objects with the fields year, title, description.

Example:
[
  {{
    "year": "1969",
    "title": "Apollo 11 Moon landing",
    "description": "Neil Armstrong became the first person to walk on the Moon."
  }}
]

Reply with the JSON array only."#,
        date = today.format("%B %-d"),
    )
}

fn parse_events(content: &str) -> Result<Vec<HistoryEvent>, HistoryError> {
    let value = serde_json::from_str::<Value>(content)
        .ok()
        .or_else(|| {
            JSON_ARRAY_RE
                .find(content)
                .and_then(|span| serde_json::from_str::<Value>(span.as_str()).ok())
        })
        .ok_or(HistoryError::NotJson)?;

    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or(HistoryError::InvalidFormat)?;

    Ok(items
        .iter()
        .take(MAX_EVENTS)
        .map(|item| HistoryEvent {
            year: field_or(item, "year", "Unknown"),
            title: field_or(item, "title", "Historical event"),
            description: field_or(item, "description", "No description"),
        })
        .collect())
}

fn field_or(item: &Value, name: &str, fallback: &str) -> String {
    match item.get(name) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingClient {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionClient for CountingClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<Option<String>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn ttl_boundary_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let cache: DayCache<Vec<u32>> = DayCache::new(dir.path(), clock.clone());
        cache.put("history-07-20", vec![1, 2]).await.unwrap();

        let epsilon = Duration::seconds(1);
        clock.advance(Duration::hours(24) - epsilon);
        assert_eq!(
            cache.get("history-07-20").await,
            Some((vec![1, 2], CacheTier::Memory))
        );

        clock.advance(epsilon * 2);
        assert_eq!(cache.get("history-07-20").await, None);
    }

    #[tokio::test]
    async fn disk_hit_is_promoted_to_memory() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let writer: DayCache<Vec<u32>> = DayCache::new(dir.path(), clock.clone());
        writer.put("k", vec![7]).await.unwrap();

        let reader: DayCache<Vec<u32>> = DayCache::new(dir.path(), clock.clone());
        assert_eq!(reader.get("k").await, Some((vec![7], CacheTier::Disk)));
        assert_eq!(reader.get("k").await, Some((vec![7], CacheTier::Memory)));
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("k.json"), "not json").unwrap();
        let cache: DayCache<Vec<u32>> = DayCache::new(dir.path(), clock());
        assert_eq!(cache.get("k").await, None);
        assert!(matches!(
            cache.read_file("k").await,
            Err(HistoryError::Serde { .. })
        ));
    }

    #[tokio::test]
    async fn unwritable_cache_dir_still_serves_from_memory() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("cache");
        std::fs::write(&blocked, "a file, not a directory").unwrap();
        let cache: DayCache<Vec<u32>> = DayCache::new(&blocked, clock());

        let err = cache.put("k", vec![3]).await.unwrap_err();
        assert!(matches!(err, HistoryError::Io { .. }));
        assert!(err.to_string().contains("cache"));
        assert_eq!(cache.get("k").await, Some((vec![3], CacheTier::Memory)));
    }

    #[test]
    fn parse_errors_keep_their_messages() {
        assert_eq!(
            parse_events("nothing here").unwrap_err().to_string(),
            "Failed to parse history events as JSON"
        );
        assert_eq!(
            parse_events("[]").unwrap_err().to_string(),
            "Invalid events format from completion endpoint"
        );
        assert!(matches!(
            parse_events(r#"{"year": "1969"}"#),
            Err(HistoryError::InvalidFormat)
        ));
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(CountingClient {
            reply: Some(
                r#"[{"year": 1969, "title": "Moon landing", "description": "One small step"},
                    {"year": "1985", "title": "", "description": "Live Aid"},
                    {"year": "1990"}, {"year": "2000"}]"#
                    .into(),
            ),
            calls: AtomicUsize::new(0),
        });
        let service = HistoryService::new(client.clone(), clock(), dir.path());

        let first = service.today().await;
        assert!(first.success);
        assert!(!first.cached);
        assert_eq!(first.date, "July 20");
        assert_eq!(first.events.len(), 3);
        assert_eq!(first.events[0].year, "1969");
        assert_eq!(first.events[1].title, "Historical event");
        assert_eq!(first.events[2].description, "No description");
        assert!(dir.path().join("history-07-20.json").exists());

        let second = service.today().await;
        assert!(second.cached);
        assert_eq!(second.events, first.events);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_fall_back_to_defaults_without_caching() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(CountingClient {
            reply: Some("I cannot answer that".into()),
            calls: AtomicUsize::new(0),
        });
        let service = HistoryService::new(client.clone(), clock(), dir.path());

        let response = service.today().await;
        assert!(!response.success);
        assert!(!response.cached);
        assert_eq!(response.events, default_events());
        assert_eq!(
            response.error.as_deref(),
            Some("Failed to parse history events as JSON")
        );

        service.today().await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
