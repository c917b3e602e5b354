//! Distributed lock manager
//!
//! Locks are records `namespace + key -> holder token` in the shared fast store,
//! written with a conditional set and an expiry. Release and extend are
//! compare-and-mutate operations executed atomically by the store, so a caller
//! whose lock silently expired can never delete or prolong a lock that has
//! since been granted to someone else.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use warden_common::WardenResult;
use warden_common::config::LockConfig;
use warden_store::FastStore;

use super::model::{HolderToken, LockOptions, LockStats, LockStatsCollector};
use crate::retry::{Sleeper, TokioSleeper};

/// Acquires, releases and extends named locks shared across processes
pub struct LockManager {
    store: Arc<dyn FastStore>,
    sleeper: Arc<dyn Sleeper>,
    namespace: String,
    defaults: LockOptions,
    stats: LockStatsCollector,
}

impl LockManager {
    pub fn new(store: Arc<dyn FastStore>) -> Self {
        Self::from_config(store, &LockConfig::default())
    }

    pub fn from_config(store: Arc<dyn FastStore>, config: &LockConfig) -> Self {
        Self {
            store,
            sleeper: Arc::new(TokioSleeper),
            namespace: config.namespace.clone(),
            defaults: LockOptions::from_config(config),
            stats: LockStatsCollector::default(),
        }
    }

    /// Replace the delay used between acquisition attempts
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_defaults(mut self, defaults: LockOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &LockOptions {
        &self.defaults
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Try to acquire `key`, retrying up to `max_retries` more times
    ///
    /// Returns the fencing token on success and `None` when the lock stayed
    /// busy (or the store stayed unreachable) through every attempt.
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
        retry_interval: Duration,
    ) -> Option<HolderToken> {
        let record_key = self.record_key(key);
        let token = HolderToken::generate();
        let attempts = max_retries.saturating_add(1);
        // Set after a store error: the write may have landed even though the
        // reply was lost
        let mut outcome_unknown = false;

        for attempt in 1..=attempts {
            match self.store.set_if_absent(&record_key, &token, ttl).await {
                Ok(true) => {
                    self.stats.record_acquired();
                    debug!(key = %key, attempt, "Lock acquired");
                    return Some(token);
                }
                Ok(false) => {
                    if outcome_unknown && self.holds(&record_key, &token).await {
                        self.stats.record_acquired();
                        debug!(key = %key, attempt, "Lock acquired by an earlier unacknowledged attempt");
                        return Some(token);
                    }
                    self.stats.record_contended();
                    debug!(key = %key, attempt, attempts, "Lock is held by another owner");
                }
                Err(e) => {
                    outcome_unknown = true;
                    self.stats.record_store_error();
                    warn!(key = %key, attempt, attempts, error = %e, "Lock acquisition attempt failed");
                }
            }

            if attempt < attempts {
                self.sleeper.sleep(retry_interval).await;
            }
        }

        if outcome_unknown && self.holds(&record_key, &token).await {
            self.stats.record_acquired();
            return Some(token);
        }

        self.stats.record_failed();
        debug!(key = %key, attempts, "Lock acquisition gave up");
        None
    }

    /// `acquire` with parameters taken from `options`
    pub async fn acquire_with(&self, key: &str, options: &LockOptions) -> Option<HolderToken> {
        self.acquire(key, options.ttl, options.max_retries, options.retry_interval)
            .await
    }

    /// Release `key` if `token` still holds it
    ///
    /// `Ok(false)` means the lock expired or now belongs to someone else.
    pub async fn release(&self, key: &str, token: &str) -> WardenResult<bool> {
        let released = self
            .store
            .compare_and_delete(&self.record_key(key), token)
            .await?;

        self.stats.record_release(released);
        if released {
            debug!(key = %key, "Lock released");
        } else {
            debug!(key = %key, "Lock release refused, token no longer holds the lock");
        }
        Ok(released)
    }

    /// Reset the expiry of `key` to `ttl` if `token` still holds it
    pub async fn extend(&self, key: &str, token: &str, ttl: Duration) -> WardenResult<bool> {
        let extended = self
            .store
            .compare_and_expire(&self.record_key(key), token, ttl)
            .await?;

        self.stats.record_extend(extended);
        if extended {
            debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Lock extended");
        } else {
            debug!(key = %key, "Lock extension refused, token no longer holds the lock");
        }
        Ok(extended)
    }

    /// Token currently holding `key`, if any
    pub async fn holder(&self, key: &str) -> WardenResult<Option<String>> {
        Ok(self.store.get(&self.record_key(key)).await?)
    }

    pub fn stats(&self) -> LockStats {
        self.stats.snapshot()
    }

    async fn holds(&self, record_key: &str, token: &str) -> bool {
        matches!(self.store.get(record_key).await, Ok(Some(holder)) if holder == token)
    }
}
