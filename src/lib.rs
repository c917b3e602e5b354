//! Warden: concurrency control for shared mutable state
//!
//! Distributed locks with fenced release, optimistic updates over versioned
//! records, relational row locks inside caller-owned transactions, and atomic
//! counters. [`Warden`] wires every component from a [`WardenConfig`].

mod bootstrap;

pub use bootstrap::Warden;

pub use warden_common::{
    Clock, ManualClock, StoreError, SystemClock, WardenConfig, WardenError, WardenResult, config,
    logging,
};
pub use warden_coordination::{
    Coordinator, CounterService, HolderToken, LockManager, LockMode, LockOptions, LockStats,
    LockWatchdog, MemoryVersionedRepository, OptimisticController, PessimisticLockController,
    RecordingSleeper, Sleeper, TokioSleeper, Versioned, VersionedRepository,
};
pub use warden_store::{FastStore, MemoryFastStore, StoreResult};
#[cfg(feature = "redis")]
pub use warden_store::RedisFastStore;
