//! Warden Persistence - Relational and versioned record access
//!
//! This crate provides:
//! - Pessimistic row locking inside a caller-owned SeaORM transaction
//! - The versioned record contract used by optimistic updates
//! - An in-memory versioned repository

pub mod pessimistic;
pub mod versioned;

pub use pessimistic::{LockMode, PessimisticLockController};
pub use versioned::{MemoryVersionedRepository, Versioned, VersionedRepository};
