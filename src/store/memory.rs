use super::{CounterStore, StoreResult};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    State(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    ChronoDuration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}

/// In-process store backed by a sharded concurrent map.
///
/// Expired entries read as absent and are dropped by [`MemoryStore::purge_expired`].
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key`, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry
            .expires_at
            .and_then(|at| at.signed_duration_since(now).to_std().ok())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_and_get(&self, key: &str) -> StoreResult<i64> {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                value: Value::Counter(0),
                expires_at: None,
            };
        }
        match &mut entry.value {
            Value::Counter(count) => {
                *count += 1;
                Ok(*count)
            }
            Value::State(_) => Err(StoreError::InvalidValue {
                key: key.to_string(),
                reason: "value is not an integer".to_string(),
            }),
        }
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let now = self.clock.now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = expiry_from(now, ttl);
            }
        }
        Ok(())
    }

    async fn get_count(&self, key: &str) -> StoreResult<i64> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                Value::Counter(count) => Ok(*count),
                Value::State(_) => Err(StoreError::InvalidValue {
                    key: key.to_string(),
                    reason: "value is not an integer".to_string(),
                }),
            },
            _ => Ok(0),
        }
    }

    async fn delete_key(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn set_state(&self, key: &str, state: &str, ttl: Duration) -> StoreResult<()> {
        let now = self.clock.now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            expiry_from(now, ttl)
        };
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::State(state.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_state(&self, key: &str) -> StoreResult<String> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                Value::State(state) => Ok(state.clone()),
                Value::Counter(count) => Ok(count.to_string()),
            },
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
