//! Distributed lock data model

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_common::config::LockConfig;
use warden_common::new_holder_token;

/// Fencing token identifying one successful acquisition
///
/// Only the holder of the token can release or extend the lock it was issued
/// for. Tokens are never reused across acquisitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderToken(String);

impl HolderToken {
    /// Fresh token unique to one acquisition attempt
    pub fn generate() -> Self {
        Self(new_holder_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for HolderToken {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HolderToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acquisition parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Time-to-live of the lock record
    pub ttl: Duration,
    /// Additional attempts after the first one fails
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_interval: Duration,
    /// Keep extending the lock while a `with_lock` body runs
    pub auto_extend: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from_config(&LockConfig::default())
    }
}

impl LockOptions {
    pub fn from_config(config: &LockConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_retries: config.max_retries,
            retry_interval: config.retry_interval(),
            auto_extend: config.auto_extend,
        }
    }

    /// Single attempt, fail fast when the lock is held
    pub fn try_once(ttl: Duration) -> Self {
        Self {
            ttl,
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_interval: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_auto_extend(mut self, auto_extend: bool) -> Self {
        self.auto_extend = auto_extend;
        self
    }

    /// Total attempts an acquisition may make
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Acquisitions that gave up after exhausting retries
    pub failed_acquisitions: u64,
    /// Attempts that found the lock held by someone else
    pub contended_attempts: u64,
    /// Attempts that failed talking to the store
    pub store_errors: u64,
    pub releases: u64,
    /// Releases refused because the token no longer matched
    pub rejected_releases: u64,
    pub extensions: u64,
    /// Extensions refused because the token no longer matched
    pub rejected_extensions: u64,
}

#[derive(Default)]
pub(crate) struct LockStatsCollector {
    pub acquisitions: AtomicU64,
    pub failed_acquisitions: AtomicU64,
    pub contended_attempts: AtomicU64,
    pub store_errors: AtomicU64,
    pub releases: AtomicU64,
    pub rejected_releases: AtomicU64,
    pub extensions: AtomicU64,
    pub rejected_extensions: AtomicU64,
}

impl LockStatsCollector {
    pub fn record_acquired(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("warden_lock_acquired_total").increment(1);
    }

    pub fn record_failed(&self) {
        self.failed_acquisitions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("warden_lock_acquire_failed_total").increment(1);
    }

    pub fn record_contended(&self) {
        self.contended_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("warden_lock_store_errors_total").increment(1);
    }

    pub fn record_release(&self, released: bool) {
        if released {
            self.releases.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("warden_lock_released_total").increment(1);
        } else {
            self.rejected_releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_extend(&self, extended: bool) {
        if extended {
            self.extensions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("warden_lock_extended_total").increment(1);
        } else {
            self.rejected_extensions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            failed_acquisitions: self.failed_acquisitions.load(Ordering::Relaxed),
            contended_attempts: self.contended_attempts.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            rejected_releases: self.rejected_releases.load(Ordering::Relaxed),
            extensions: self.extensions.load(Ordering::Relaxed),
            rejected_extensions: self.rejected_extensions.load(Ordering::Relaxed),
        }
    }
}
