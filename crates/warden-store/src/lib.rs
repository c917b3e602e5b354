//! Warden Store - Shared fast store adapters
//!
//! This crate provides:
//! - The `FastStore` contract the lock manager and counters are written against
//! - `MemoryFastStore`, a DashMap-backed store with injectable clock
//! - `RedisFastStore`, backed by Redis with server-side scripts (feature `redis`)

mod fast_store;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use fast_store::*;
pub use memory::MemoryFastStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisFastStore;
