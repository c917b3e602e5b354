//! Versioned records for optimistic concurrency
//!
//! A versioned record carries a `version` counter owned by the concurrency
//! layer. Writers present the version they observed; the repository accepts the
//! write only if the stored version is unchanged. SQL-backed repositories map
//! `compare_and_swap` onto
//! `UPDATE ... SET version = :new WHERE id = :id AND version = :expected`
//! and treat zero affected rows as a conflict.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use warden_common::{WardenError, WardenResult};

/// A record with a managed version field
pub trait Versioned: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Display + Send + Sync + 'static;

    /// Entity name reported in conflict and not-found errors
    fn entity_name() -> &'static str;

    fn id(&self) -> Self::Id;

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);
}

/// Storage for versioned records
#[async_trait]
pub trait VersionedRepository<T: Versioned>: Send + Sync {
    /// Current persisted state, `None` if the record does not exist
    async fn fetch(&self, id: &T::Id) -> WardenResult<Option<T>>;

    /// Store `record` only if the persisted version equals `expected_version`
    ///
    /// `record` already carries its new version. Returns the stored record, or
    /// `None` when another writer got there first.
    async fn compare_and_swap(&self, expected_version: u64, record: T) -> WardenResult<Option<T>>;
}

/// In-memory repository using DashMap
pub struct MemoryVersionedRepository<T: Versioned> {
    records: Arc<DashMap<T::Id, T>>,
}

impl<T: Versioned> MemoryVersionedRepository<T> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    /// Insert or overwrite a record as-is, bypassing the version check
    pub fn insert(&self, record: T) {
        self.records.insert(record.id(), record);
    }

    pub fn get(&self, id: &T::Id) -> Option<T> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn remove(&self, id: &T::Id) -> Option<T> {
        self.records.remove(id).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: Versioned> Default for MemoryVersionedRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Versioned> VersionedRepository<T> for MemoryVersionedRepository<T> {
    async fn fetch(&self, id: &T::Id) -> WardenResult<Option<T>> {
        Ok(self.get(id))
    }

    async fn compare_and_swap(&self, expected_version: u64, record: T) -> WardenResult<Option<T>> {
        let id = record.id();
        let Some(mut current) = self.records.get_mut(&id) else {
            return Err(WardenError::NotFound(format!(
                "{} '{}'",
                T::entity_name(),
                id
            )));
        };

        if current.version() != expected_version {
            return Ok(None);
        }

        *current = record.clone();
        Ok(Some(record))
    }
}
