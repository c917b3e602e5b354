//! Distributed Lock Implementation
//!
//! This module provides:
//! - Lock data model: fencing tokens, acquisition options, statistics
//! - Lock acquire/release/extend over the shared fast store
//! - Watchdog renewal for long-running critical sections

mod manager;
mod model;
mod watchdog;

pub use manager::LockManager;
pub use model::{HolderToken, LockOptions, LockStats};
pub use watchdog::LockWatchdog;
