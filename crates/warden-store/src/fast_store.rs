// Fast store contract
// The single shared mutable resource behind locks and counters

use std::time::Duration;

use async_trait::async_trait;
use warden_common::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared key-value store with conditional writes and atomic increments
///
/// Every method is a potential suspension point (a network round trip for remote
/// stores). Conditional operations must be atomic on the store side: a
/// check performed on the client followed by a separate write is not an
/// acceptable implementation.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// `SET key value NX PX ttl`
    ///
    /// Returns `true` only if no unexpired value existed and the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if its current value equals `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Reset the expiry of `key` to `ttl` only if its current value equals `expected`
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration)
    -> StoreResult<bool>;

    /// Atomically add `delta` to the integer at `key` (absent reads as 0)
    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditional delete, returns whether a value was removed
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// TTL in whole milliseconds, never zero
///
/// Stores reject a zero expiry; sub-millisecond durations round up.
pub fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}
