// Fault-injecting stores shared by the unit tests of this crate

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use warden_common::StoreError;
use warden_store::{FastStore, MemoryFastStore, StoreResult};

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

/// Store whose every call fails
pub(crate) struct UnreachableStore;

#[async_trait]
impl FastStore for UnreachableStore {
    async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> StoreResult<bool> {
        Err(down())
    }

    async fn compare_and_delete(&self, _: &str, _: &str) -> StoreResult<bool> {
        Err(down())
    }

    async fn compare_and_expire(&self, _: &str, _: &str, _: Duration) -> StoreResult<bool> {
        Err(down())
    }

    async fn incr_by(&self, _: &str, _: i64) -> StoreResult<i64> {
        Err(down())
    }

    async fn get(&self, _: &str) -> StoreResult<Option<String>> {
        Err(down())
    }

    async fn delete(&self, _: &str) -> StoreResult<bool> {
        Err(down())
    }
}

/// Memory store whose first `failures` conditional sets fail
///
/// With `apply_failed_writes` the failing calls still write, modelling a reply
/// lost after the server applied the command.
pub(crate) struct FlakyStore {
    pub inner: Arc<MemoryFastStore>,
    failures: AtomicU32,
    apply_failed_writes: bool,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: Arc::new(MemoryFastStore::new()),
            failures: AtomicU32::new(failures),
            apply_failed_writes: false,
        }
    }

    pub fn losing_replies(failures: u32) -> Self {
        Self {
            apply_failed_writes: true,
            ..Self::new(failures)
        }
    }

    fn should_fail(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl FastStore for FlakyStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        if self.should_fail() {
            if self.apply_failed_writes {
                self.inner.set_if_absent(key, value, ttl).await?;
            }
            return Err(down());
        }
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        self.inner.compare_and_expire(key, expected, ttl).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        self.inner.incr_by(key, delta).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }
}
