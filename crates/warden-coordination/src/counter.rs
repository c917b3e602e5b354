// Atomic counters for hot aggregates (download counts, collection totals)
// Increments use the store's native INCRBY, so no lock is taken; reads are
// lossy by policy and fall back to 0 when the store cannot answer

use std::sync::Arc;

use tracing::warn;
use warden_common::WardenResult;
use warden_common::config::CounterConfig;
use warden_store::FastStore;

pub struct CounterService {
    store: Arc<dyn FastStore>,
    namespace: String,
}

impl CounterService {
    pub fn new(store: Arc<dyn FastStore>) -> Self {
        Self::from_config(store, &CounterConfig::default())
    }

    pub fn from_config(store: Arc<dyn FastStore>, config: &CounterConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Add `delta` and return the new value
    pub async fn increment(&self, key: &str, delta: i64) -> WardenResult<i64> {
        Ok(self.store.incr_by(&self.counter_key(key), delta).await?)
    }

    /// Current value; absent counters, store failures and unreadable values read as 0
    pub async fn read(&self, key: &str) -> i64 {
        match self.store.get(&self.counter_key(key)).await {
            Ok(None) => 0,
            Ok(Some(raw)) => raw.parse::<i64>().unwrap_or_else(|_| {
                warn!(key = %key, value = %raw, "Counter holds a non-integer value, reading as 0");
                metrics::counter!("warden_counter_degraded_reads_total").increment(1);
                0
            }),
            Err(e) => {
                warn!(key = %key, error = %e, "Counter read failed, reading as 0");
                metrics::counter!("warden_counter_degraded_reads_total").increment(1);
                0
            }
        }
    }

    /// Drop the counter; the next increment starts from 0
    pub async fn reset(&self, key: &str) -> WardenResult<bool> {
        Ok(self.store.delete(&self.counter_key(key)).await?)
    }
}
