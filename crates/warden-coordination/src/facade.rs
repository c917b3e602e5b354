//! Coordination facade
//!
//! `with_lock` runs a closure while holding a distributed lock and releases the
//! lock on every exit path: normal return, `Err` return, panic, and
//! cancellation of the enclosing future. The last two go through a drop guard
//! that hands the release to the current Tokio runtime.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};
use warden_common::WardenError;

use crate::lock::{HolderToken, LockManager, LockOptions, LockWatchdog};

/// Runs critical sections under distributed locks
#[derive(Clone)]
pub struct Coordinator {
    locks: Arc<LockManager>,
}

impl Coordinator {
    pub fn new(locks: Arc<LockManager>) -> Self {
        Self { locks }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Acquire `key`, run `f` exactly once, release
    ///
    /// Fails with `LockUnavailable` without calling `f` when the lock cannot be
    /// acquired within `options`. Otherwise returns whatever `f` returns, with
    /// one exception: under `auto_extend`, an `Ok` from `f` becomes `LockLost`
    /// if the watchdog found the lock taken away, since mutual exclusion no
    /// longer held for the whole body. The call itself is never retried.
    pub async fn with_lock<F, Fut, T, E>(&self, key: &str, options: &LockOptions, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<WardenError>,
    {
        let Some(token) = self.locks.acquire_with(key, options).await else {
            return Err(WardenError::LockUnavailable {
                key: key.to_string(),
                attempts: options.attempts(),
            }
            .into());
        };

        let guard = ReleaseGuard {
            locks: self.locks.clone(),
            key: key.to_string(),
            token: Some(token.clone()),
        };
        let watchdog = options
            .auto_extend
            .then(|| LockWatchdog::spawn(self.locks.clone(), key, token, options.ttl));

        let result = f().await;

        let lost = match watchdog {
            Some(watchdog) => !watchdog.stop().await,
            None => false,
        };
        guard.release().await;

        if lost {
            warn!(key = %key, "Lock was lost while the critical section ran");
            if result.is_ok() {
                return Err(WardenError::LockLost {
                    key: key.to_string(),
                }
                .into());
            }
        }
        result
    }

    /// `with_lock` using the lock manager's default options
    pub async fn with_default_lock<F, Fut, T, E>(&self, key: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<WardenError>,
    {
        let options = self.locks.defaults().clone();
        self.with_lock(key, &options, f).await
    }
}

/// Releases the lock when dropped without an explicit release
struct ReleaseGuard {
    locks: Arc<LockManager>,
    key: String,
    token: Option<HolderToken>,
}

impl ReleaseGuard {
    async fn release(mut self) {
        if let Some(token) = self.token.take() {
            release_logged(&self.locks, &self.key, &token).await;
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let locks = self.locks.clone();
                let key = std::mem::take(&mut self.key);
                debug!(key = %key, "Releasing lock from an abandoned critical section");
                handle.spawn(async move {
                    release_logged(&locks, &key, &token).await;
                });
            }
            Err(_) => {
                warn!(key = %self.key, "No runtime to release lock, it will expire after its TTL");
            }
        }
    }
}

async fn release_logged(locks: &LockManager, key: &str, token: &str) {
    match locks.release(key, token).await {
        Ok(true) => {}
        Ok(false) => warn!(key = %key, "Lock had already expired or changed hands at release"),
        Err(e) => warn!(key = %key, error = %e, "Lock release failed, it will expire after its TTL"),
    }
}
