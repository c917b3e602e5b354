//! Warden Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Warden components:
//! - Error types surfaced to callers of the concurrency layer
//! - Configuration loading
//! - Logging bootstrap
//! - Clock abstraction and holder token generation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WardenConfig;
pub use error::{StoreError, WardenError, WardenResult};
pub use utils::{current_timestamp, new_holder_token};

/// Default key prefix for lock records in the fast store
pub const DEFAULT_LOCK_NAMESPACE: &str = "lock:";

/// Default key prefix for counters in the fast store
pub const DEFAULT_COUNTER_NAMESPACE: &str = "counter:";
