//! Shared handles every process and worker runs against.

use std::sync::Arc;

use crate::config::Config;
use crate::keys::{key_hash, KeyHasher, KeySpace};
use crate::queue::{MemoryQueue, WorkQueue};
use crate::store::{KeyValueStore, MemoryStore};
use crate::workload::Registry;

pub struct Context {
    pub store: Arc<dyn KeyValueStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub registry: Registry,
    pub config: Config,
    pub keys: KeySpace,
    /// Maps user keys to storage addresses.
    pub hasher: KeyHasher,
}

impl Context {
    /// A context over the given backends with the built-in registry and the
    /// default configuration.
    pub fn new(store: Arc<dyn KeyValueStore>, queue: Arc<dyn WorkQueue>) -> Self {
        let config = Config::default();
        Self {
            store,
            queue,
            registry: Registry::builtin(),
            keys: KeySpace::new(config.namespace.clone()),
            config,
            hasher: key_hash,
        }
    }

    /// In-process store and queue.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryQueue::new()))
    }

    /// Connect the store and the queue to the Redis server at `config.redis_url`.
    #[cfg(feature = "redis")]
    pub fn redis(config: Config) -> crate::error::Result<Self> {
        let url = config.redis_url.clone().ok_or_else(|| {
            crate::error::Error::Config("redis_url is required for the redis backend".into())
        })?;
        let store = crate::store::RedisStore::connect(&url)?;
        let queue = crate::queue::RedisQueue::connect(&url, &config.namespace)?;
        Ok(Self::new(Arc::new(store), Arc::new(queue)).with_config(config))
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.keys = KeySpace::new(config.namespace.clone());
        self.config = config;
        self
    }

    pub fn with_hasher(mut self, hasher: KeyHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Every queue lane a unit of this context can land on.
    pub fn lanes(&self) -> Vec<String> {
        self.registry.lanes(&self.config.default_queue)
    }
}
