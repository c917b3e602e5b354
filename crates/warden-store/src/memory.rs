// In-memory fast store
// Single-process stand-in for Redis: DashMap shards give per-key atomicity,
// expiry is evaluated lazily against an injected clock

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use warden_common::{Clock, StoreError, SystemClock};

use crate::fast_store::{FastStore, StoreResult, ttl_millis};

/// A stored value with optional absolute expiry (Unix millis)
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<i64>,
}

impl StoredValue {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-memory `FastStore` implementation using DashMap
pub struct MemoryFastStore {
    entries: Arc<DashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
    /// Background sweep task handle
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryFastStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
            cleanup_handle: None,
        }
    }

    /// Start a background task that drops expired entries every `interval`
    ///
    /// Must be called from within a Tokio runtime. Expiry is still enforced
    /// lazily on every access; the sweep only bounds memory.
    pub fn with_cleanup(mut self, interval: Duration) -> Self {
        let entries = self.entries.clone();
        let clock = self.clock.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                let purged = purge(&entries, clock.now_millis());
                if purged > 0 {
                    debug!(count = purged, "Cleaned up expired store entries");
                }
            }
        });

        self.cleanup_handle = Some(handle);
        self
    }

    /// Remove every expired entry now, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries, self.clock.now_millis())
    }

    /// Number of physically stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expiry_from_now(&self, ttl: Duration) -> i64 {
        self.clock.now_millis() + ttl_millis(ttl) as i64
    }
}

fn purge(entries: &DashMap<String, StoredValue>, now: i64) -> usize {
    let before = entries.len();
    entries.retain(|_, v| !v.is_expired(now));
    before.saturating_sub(entries.len())
}

impl Default for MemoryFastStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryFastStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl FastStore for MemoryFastStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now_millis();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: Some(self.expiry_from_now(ttl)),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(stored);
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let now = self.clock.now_millis();
        let removed = self
            .entries
            .remove_if(key, |_, v| !v.is_expired(now) && v.value == expected);
        Ok(removed.is_some())
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = self.clock.now_millis();
        let expires_at = self.expiry_from_now(ttl);

        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        if entry.is_expired(now) || entry.value != expected {
            return Ok(false);
        }

        entry.expires_at = Some(expires_at);
        Ok(true)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let now = self.clock.now_millis();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = if entry.get().is_expired(now) {
                    entry.get_mut().expires_at = None;
                    0
                } else {
                    entry
                        .get()
                        .value
                        .parse::<i64>()
                        .map_err(|_| StoreError::InvalidValue {
                            key: key.to_string(),
                            reason: "value is not an integer".to_string(),
                        })?
                };

                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| StoreError::InvalidValue {
                        key: key.to_string(),
                        reason: "increment would overflow".to_string(),
                    })?;
                entry.get_mut().value = next.to_string();
                Ok(next)
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue {
                    value: delta.to_string(),
                    expires_at: None,
                });
                Ok(delta)
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .get(key)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.value.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired(now)))
    }
}
