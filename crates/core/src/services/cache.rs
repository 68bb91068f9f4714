//! Keyed query cache backing the optimistic mutation protocol.
//!
//! Entries are task lists keyed by [`QueryKey`]. Every fetch takes a
//! [`FetchTicket`]; cancelling a scope bumps the generation of its keys so a
//! slower fetch that completes afterwards cannot overwrite an optimistic write.
//!
//! Keys nobody has read or written for the gc time are dropped on the next
//! write, so one-off search filters do not pile up.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::model::{Task, TaskFilters};

pub const DEFAULT_STALE_TIME_SECS: i64 = 60;
pub const DEFAULT_GC_TIME_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    List { user_id: String, filters: TaskFilters },
    Deleted { user_id: String },
}

impl QueryKey {
    pub fn list(user_id: impl Into<String>, filters: TaskFilters) -> Self {
        QueryKey::List {
            user_id: user_id.into(),
            filters,
        }
    }

    pub fn deleted(user_id: impl Into<String>) -> Self {
        QueryKey::Deleted {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            QueryKey::List { user_id, .. } | QueryKey::Deleted { user_id } => user_id,
        }
    }
}

/// A set of keys addressed by a cancel, snapshot, update or invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    All,
    /// Every key of the user.
    User(String),
    /// Every list key of the user, whatever its filters.
    Lists(String),
    Deleted(String),
}

impl KeyScope {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match (self, key) {
            (KeyScope::All, _) => true,
            (KeyScope::User(user), key) => key.user_id() == user,
            (KeyScope::Lists(user), QueryKey::List { user_id, .. }) => user_id == user,
            (KeyScope::Deleted(user), QueryKey::Deleted { user_id }) => user_id == user,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    data: Vec<Task>,
    fetched_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
    invalidated: bool,
}

impl Entry {
    fn fetched(data: Vec<Task>, now: DateTime<Utc>) -> Self {
        Self {
            data,
            fetched_at: now,
            last_used: now,
            invalidated: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Generation {
    value: u64,
    touched: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: QueryKey,
    generation: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

/// Cached values of every key in a scope at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    entries: Vec<(QueryKey, Entry)>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Entry>,
    generations: HashMap<QueryKey, Generation>,
    /// Generation handed to keys with no record. Raised past every pruned
    /// record so an old ticket can never match a recycled key.
    floor: u64,
}

impl State {
    fn generation(&self, key: &QueryKey) -> u64 {
        self.generations
            .get(key)
            .map(|g| g.value)
            .unwrap_or(self.floor)
    }

    fn prune(&mut self, now: DateTime<Utc>, gc_time: Duration) {
        let State {
            entries,
            generations,
            floor,
        } = self;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.last_used < gc_time);
        generations.retain(|key, generation| {
            let keep = entries.contains_key(key) || now - generation.touched < gc_time;
            if !keep {
                *floor = (*floor).max(generation.value + 1);
            }
            keep
        });
        if entries.len() < before {
            tracing::debug!(evicted = before - entries.len(), "evicted unused queries");
        }
    }
}

pub struct QueryCache {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    stale_time: Duration,
    gc_time: Duration,
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_stale_time(clock, Duration::seconds(DEFAULT_STALE_TIME_SECS))
    }

    pub fn with_stale_time(clock: Arc<dyn Clock>, stale_time: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            stale_time,
            gc_time: Duration::seconds(DEFAULT_GC_TIME_SECS),
        }
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn get(&self, key: &QueryKey) -> Option<Vec<Task>> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(key)?;
        entry.last_used = now;
        Some(entry.data.clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// A value younger than the stale time that no mutation has invalidated.
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| !e.invalidated && now - e.fetched_at < self.stale_time)
            .unwrap_or(false)
    }

    pub fn set(&self, key: QueryKey, data: Vec<Task>) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.entries.insert(key, Entry::fetched(data, now));
        state.prune(now, self.gc_time);
    }

    pub fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let value = state.floor;
        let generation = state
            .generations
            .entry(key.clone())
            .or_insert(Generation {
                value,
                touched: now,
            });
        generation.touched = now;
        FetchTicket {
            key: key.clone(),
            generation: generation.value,
        }
    }

    /// Stores the fetched value unless the key was cancelled after the ticket
    /// was taken. Returns whether the value was stored.
    pub fn complete_fetch(&self, ticket: FetchTicket, data: Vec<Task>) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.generation(&ticket.key) != ticket.generation {
            tracing::debug!(key = ?ticket.key, "discarding cancelled fetch");
            return false;
        }
        state.entries.insert(ticket.key, Entry::fetched(data, now));
        state.prune(now, self.gc_time);
        true
    }

    pub fn cancel(&self, scope: &KeyScope) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let State {
            entries,
            generations,
            floor,
        } = &mut *state;
        for key in entries.keys() {
            generations.entry(key.clone()).or_insert(Generation {
                value: *floor,
                touched: now,
            });
        }
        for (key, generation) in generations.iter_mut() {
            if scope.matches(key) {
                generation.value += 1;
                generation.touched = now;
            }
        }
    }

    pub fn snapshot(&self, scope: &KeyScope) -> Snapshot {
        let state = self.state.lock();
        let entries = state
            .entries
            .iter()
            .filter(|(key, _)| scope.matches(key))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        Snapshot { entries }
    }

    /// Puts every key of the snapshot back exactly as it was.
    pub fn restore(&self, snapshot: Snapshot) {
        let mut state = self.state.lock();
        for (key, entry) in snapshot.entries {
            state.entries.insert(key, entry);
        }
    }

    /// Applies `f` to every cached value in the scope. Keys without a value are left alone.
    pub fn update_where<F>(&self, scope: &KeyScope, mut f: F)
    where
        F: FnMut(&mut Vec<Task>),
    {
        let mut state = self.state.lock();
        for (key, entry) in state.entries.iter_mut() {
            if scope.matches(key) {
                f(&mut entry.data);
            }
        }
    }

    /// Marks every value in the scope stale so the next read refetches it.
    pub fn invalidate(&self, scope: &KeyScope) {
        let mut state = self.state.lock();
        for (key, entry) in state.entries.iter_mut() {
            if scope.matches(key) {
                entry.invalidated = true;
            }
        }
    }

    /// Drops every value. Generations survive so in-flight fetches stay cancellable.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
    }
}
