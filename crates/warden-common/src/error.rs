//! Error types for Warden
//!
//! This module defines:
//! - `StoreError`: failures reported by a fast store adapter
//! - `WardenError`: conditions surfaced to callers of the concurrency layer

/// Errors reported by a fast store adapter
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport or infrastructure failure talking to the store
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The stored value cannot be used for the requested operation
    #[error("invalid value for key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Conditions surfaced by the concurrency control layer
#[derive(thiserror::Error, Debug)]
pub enum WardenError {
    #[error("lock '{key}' unavailable after {attempts} attempt(s)")]
    LockUnavailable { key: String, attempts: u32 },

    #[error("version conflict on {entity} '{id}' after {attempts} attempt(s)")]
    VersionConflict {
        entity: String,
        id: String,
        attempts: u32,
    },

    #[error("row lock on {entity} not granted within {timeout_ms}ms")]
    LockTimeout { entity: String, timeout_ms: u64 },

    /// A renewal found the lock gone or held by someone else while the
    /// critical section ran
    #[error("lock '{key}' was lost while the critical section ran")]
    LockLost { key: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("database error: {0}")]
    Database(String),

    #[error("unsupported database backend: {0}")]
    UnsupportedBackend(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl WardenError {
    /// Contention outcomes a caller may retry at a higher level
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WardenError::LockUnavailable { .. }
                | WardenError::VersionConflict { .. }
                | WardenError::LockTimeout { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WardenError::NotFound(_))
    }
}

impl From<config::ConfigError> for WardenError {
    fn from(value: config::ConfigError) -> Self {
        WardenError::Config(value.to_string())
    }
}

pub type WardenResult<T> = Result<T, WardenError>;
