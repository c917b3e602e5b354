// Component wiring
// Builds the store, lock manager, controllers and counters from one configuration

use std::sync::Arc;

use tracing::info;
use warden_common::{WardenConfig, WardenResult};
use warden_coordination::{
    Coordinator, CounterService, LockManager, OptimisticController, PessimisticLockController,
};
use warden_store::{FastStore, MemoryFastStore};

/// Every concurrency-control component, sharing one fast store
pub struct Warden {
    config: WardenConfig,
    store: Arc<dyn FastStore>,
    locks: Arc<LockManager>,
    coordinator: Coordinator,
    counters: CounterService,
    optimistic: OptimisticController,
    pessimistic: PessimisticLockController,
}

impl Warden {
    /// Connect the configured store and build every component
    ///
    /// Uses Redis when `store.redis_url` is set, otherwise an in-memory store
    /// with a background sweeper. Must be called from within a Tokio runtime.
    pub async fn from_config(config: WardenConfig) -> WardenResult<Self> {
        let store = connect_store(&config).await?;
        Ok(Self::with_store(config, store))
    }

    /// Build every component on top of an existing store
    pub fn with_store(config: WardenConfig, store: Arc<dyn FastStore>) -> Self {
        let locks = Arc::new(LockManager::from_config(store.clone(), &config.lock));

        Self {
            coordinator: Coordinator::new(locks.clone()),
            counters: CounterService::from_config(store.clone(), &config.counter),
            optimistic: OptimisticController::from_config(&config.optimistic),
            pessimistic: PessimisticLockController::from_config(&config.pessimistic),
            locks,
            store,
            config,
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FastStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn counters(&self) -> &CounterService {
        &self.counters
    }

    pub fn optimistic(&self) -> &OptimisticController {
        &self.optimistic
    }

    pub fn pessimistic(&self) -> &PessimisticLockController {
        &self.pessimistic
    }
}

#[cfg(feature = "redis")]
async fn connect_store(config: &WardenConfig) -> WardenResult<Arc<dyn FastStore>> {
    if let Some(url) = config.store.redis_url.as_deref() {
        let store = warden_store::RedisFastStore::connect(url).await?;
        info!("Using Redis fast store");
        return Ok(Arc::new(store));
    }
    Ok(memory_store(config))
}

#[cfg(not(feature = "redis"))]
async fn connect_store(config: &WardenConfig) -> WardenResult<Arc<dyn FastStore>> {
    if config.store.redis_url.is_some() {
        return Err(warden_common::WardenError::Config(
            "store.redis_url is set but Redis support was not compiled in".to_string(),
        ));
    }
    Ok(memory_store(config))
}

fn memory_store(config: &WardenConfig) -> Arc<dyn FastStore> {
    let store = MemoryFastStore::new();
    let store = match config.store.sweep_interval() {
        Some(interval) => store.with_cleanup(interval),
        None => store,
    };
    info!(
        sweep_interval_ms = config.store.sweep_interval_ms,
        "Using in-memory fast store"
    );
    Arc::new(store)
}
