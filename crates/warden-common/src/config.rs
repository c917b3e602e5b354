//! Configuration for the concurrency control layer
//!
//! Values are layered from an optional YAML/TOML file and `WARDEN__*`
//! environment variables (for example `WARDEN__LOCK__TTL_SECS=60`).
//! Every field has a default so an empty configuration is valid.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::error::WardenResult;
use crate::{DEFAULT_COUNTER_NAMESPACE, DEFAULT_LOCK_NAMESPACE};

const ENV_PREFIX: &str = "WARDEN";
const ENV_SEPARATOR: &str = "__";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub lock: LockConfig,
    pub optimistic: OptimisticConfig,
    pub pessimistic: PessimisticConfig,
    pub counter: CounterConfig,
    pub store: StoreConfig,
}

/// Distributed lock defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Key prefix for lock records
    pub namespace: String,
    /// Lock time-to-live in seconds (default: 30)
    pub ttl_secs: u64,
    /// Additional attempts after the first one fails (default: 3)
    pub max_retries: u32,
    /// Pause between attempts in milliseconds (default: 100)
    pub retry_interval_ms: u64,
    /// Keep extending the lock while a `with_lock` body runs
    pub auto_extend: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_LOCK_NAMESPACE.to_string(),
            ttl_secs: 30,
            max_retries: 3,
            retry_interval_ms: 100,
            auto_extend: false,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Optimistic update retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimisticConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for OptimisticConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 50,
        }
    }
}

impl OptimisticConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Row lock wait bound
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PessimisticConfig {
    pub timeout_ms: u64,
}

impl Default for PessimisticConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl PessimisticConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub namespace: String,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_COUNTER_NAMESPACE.to_string(),
        }
    }
}

/// Fast store connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis connection URL; the in-memory store is used when absent
    pub redis_url: Option<String>,
    /// Background sweep interval for the in-memory store (0 = lazy expiry only)
    pub sweep_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            sweep_interval_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

impl WardenConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> WardenResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
