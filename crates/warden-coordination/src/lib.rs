//! Warden Coordination - Concurrency control primitives
//!
//! This crate provides:
//! - Distributed lock manager with fencing tokens and watchdog renewal
//! - Optimistic concurrency controller with re-fetch and bounded retry
//! - Atomic counters over the shared fast store
//! - `with_lock` coordination facade with guaranteed release
//!
//! Pessimistic row locking lives in `warden-persistence` and is re-exported here.

pub mod counter;
pub mod facade;
pub mod lock;
pub mod optimistic;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use counter::CounterService;
pub use facade::Coordinator;
pub use lock::{HolderToken, LockManager, LockOptions, LockStats, LockWatchdog};
pub use optimistic::OptimisticController;
pub use retry::{RecordingSleeper, Sleeper, TokioSleeper};
pub use warden_persistence::{
    LockMode, MemoryVersionedRepository, PessimisticLockController, Versioned,
    VersionedRepository,
};
