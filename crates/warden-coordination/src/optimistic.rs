//! Optimistic concurrency controller
//!
//! Applies an update function to a versioned record and writes it back with a
//! compare-and-swap on the version. A conflicting attempt re-fetches the
//! persisted record before the update function runs again, so each retry works
//! against the latest state rather than the stale copy that conflicted.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use warden_common::config::OptimisticConfig;
use warden_common::{WardenError, WardenResult};
use warden_persistence::{Versioned, VersionedRepository};

use crate::retry::{Sleeper, TokioSleeper};

pub struct OptimisticController {
    max_retries: u32,
    retry_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for OptimisticController {
    fn default() -> Self {
        Self::from_config(&OptimisticConfig::default())
    }
}

impl OptimisticController {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn from_config(config: &OptimisticConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// `optimistic_update` with the controller's retry policy
    pub async fn update<T, R, F>(&self, repo: &R, entity: T, update_fn: F) -> WardenResult<T>
    where
        T: Versioned,
        R: VersionedRepository<T> + ?Sized,
        F: FnMut(T) -> T + Send,
    {
        self.optimistic_update(repo, entity, update_fn, self.max_retries, self.retry_delay)
            .await
    }

    /// Apply `update_fn` and persist the result, retrying conflicts
    ///
    /// `update_fn` receives a copy of the observed record and must return it
    /// with the version untouched; the controller bumps the version by one on
    /// write. An attempt conflicts when the returned version differs from the
    /// observed one or when the persisted version moved on. `update_fn` runs at
    /// most `max_retries + 1` times; exhausting them yields `VersionConflict`.
    pub async fn optimistic_update<T, R, F>(
        &self,
        repo: &R,
        entity: T,
        mut update_fn: F,
        max_retries: u32,
        retry_delay: Duration,
    ) -> WardenResult<T>
    where
        T: Versioned,
        R: VersionedRepository<T> + ?Sized,
        F: FnMut(T) -> T + Send,
    {
        let id = entity.id();
        let attempts = max_retries.saturating_add(1);
        let mut observed = entity;

        for attempt in 1..=attempts {
            let expected = observed.version();
            let mut updated = update_fn(observed.clone());

            if updated.version() == expected {
                updated.set_version(expected + 1);
                if let Some(saved) = repo.compare_and_swap(expected, updated).await? {
                    debug!(
                        entity = T::entity_name(),
                        id = %id,
                        version = saved.version(),
                        attempt,
                        "Optimistic update committed"
                    );
                    return Ok(saved);
                }
            }

            metrics::counter!("warden_optimistic_conflicts_total").increment(1);
            debug!(
                entity = T::entity_name(),
                id = %id,
                expected_version = expected,
                attempt,
                attempts,
                "Version conflict"
            );

            if attempt == attempts {
                break;
            }

            self.sleeper.sleep(retry_delay).await;
            observed = repo.fetch(&id).await?.ok_or_else(|| {
                WardenError::NotFound(format!("{} '{}'", T::entity_name(), id))
            })?;
        }

        Err(WardenError::VersionConflict {
            entity: T::entity_name().to_string(),
            id: id.to_string(),
            attempts,
        })
    }
}
