//! Engine configuration.
//!
//! Every field has a default, so an empty (or absent) TOML file is a valid
//! configuration:
//!
//! ```toml
//! namespace = "mapredus"
//! partition_size = 30
//! reduce_retry_wait = "10s"
//! result_timeout = "24h"
//! redis_url = "redis://127.0.0.1:6379/0"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_NAMESPACE: &str = "mapredus";
pub const DEFAULT_QUEUE: &str = "mapredus";
pub const DEFAULT_PARTITION_SIZE: usize = 30;
pub const DEFAULT_METRICS_WINDOW: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root of every storage key written by the engine.
    pub namespace: String,
    /// Queue lane used by implementations that do not name their own.
    pub default_queue: String,
    /// Chunk size used when a mapper does not declare one.
    pub partition_size: usize,
    /// How long a reduce unit waits before it is retried after a recoverable failure.
    #[serde(with = "humantime_serde")]
    pub reduce_retry_wait: Duration,
    /// Result cache TTL for processes that do not set one.
    #[serde(with = "humantime_serde")]
    pub result_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,
    /// TTL applied to requested/started/finished timestamps after a run completes.
    #[serde(with = "humantime_serde")]
    pub metrics_ttl: Duration,
    /// Number of recent run durations kept for ops visibility.
    pub metrics_window: usize,
    pub redis_url: Option<String>,
    pub worker_concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_queue: DEFAULT_QUEUE.to_string(),
            partition_size: DEFAULT_PARTITION_SIZE,
            reduce_retry_wait: Duration::from_secs(10),
            result_timeout: Duration::from_secs(3600 * 24),
            lock_ttl: Duration::from_secs(3600),
            metrics_ttl: Duration::from_secs(3600),
            metrics_window: DEFAULT_METRICS_WINDOW,
            redis_url: None,
            worker_concurrency: 2,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration at `path`, or the defaults if no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.partition_size == 0 {
            return Err(Error::Config("partition_size must be at least 1".into()));
        }
        if self.metrics_window == 0 {
            return Err(Error::Config("metrics_window must be at least 1".into()));
        }
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".into()));
        }
        Ok(())
    }
}
