//! Storage locations.
//!
//! Every key the engine touches is derived here from a namespace, a process
//! id and, for per-key data, the *hashed* user key. Per-process data lives
//! under `<ns>:process:<pid>` so a process can be shredded with two pattern
//! scans; the registry, the metrics window and result cache entries live
//! outside it.

use fnv::FnvHasher;
use std::hash::Hasher;

use crate::process::{Pid, State};

/// Derives the storage address of a user key.
pub type KeyHasher = fn(&str) -> String;

/// Default key hash: 64-bit FNV-1a rendered as lowercase hex.
pub fn key_hash(key: &str) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    format!("{:x}", hasher.finish())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Set of registered pids.
    pub fn processes(&self) -> String {
        format!("{}:processes", self.namespace)
    }

    /// Counter pids are allocated from.
    pub fn processes_count(&self) -> String {
        format!("{}:processes:count", self.namespace)
    }

    /// The serialized `ProcessSpec`.
    pub fn pid(&self, pid: Pid) -> String {
        format!("{}:process:{}", self.namespace, pid)
    }

    /// Patterns matching every key owned by a process.
    ///
    /// Two patterns rather than `<pid>*`, which would also match pid 10
    /// when shredding pid 1.
    pub fn process_patterns(&self, pid: Pid) -> [String; 2] {
        let base = self.pid(pid);
        let nested = format!("{}:*", base);
        [base, nested]
    }

    /// Outstanding units of work; the list length is the count.
    pub fn slaves(&self, pid: Pid) -> String {
        format!("{}:slaves", self.pid(pid))
    }

    /// Set (or sorted set when ordered) of emitted intermediate keys.
    pub fn keys(&self, pid: Pid) -> String {
        format!("{}:keys", self.pid(pid))
    }

    pub fn map(&self, pid: Pid, hashed_key: &str) -> String {
        format!("{}:map_key:{}", self.pid(pid), hashed_key)
    }

    pub fn reduce(&self, pid: Pid, hashed_key: &str) -> String {
        format!("{}:map_key:{}:reduce", self.pid(pid), hashed_key)
    }

    /// Hash => original key table used for collision detection.
    pub fn hash_to_key(&self, pid: Pid, hashed_key: &str) -> String {
        format!("{}:keyhash:{}", self.pid(pid), hashed_key)
    }

    /// The input handed to `run`.
    pub fn input(&self, pid: Pid) -> String {
        format!("{}:input", self.pid(pid))
    }

    /// Records of one input chunk.
    pub fn chunk(&self, pid: Pid, chunk_key: &str) -> String {
        format!("{}:input:{}", self.pid(pid), chunk_key)
    }

    /// Claimed by the single worker allowed to move a process out of `state`.
    pub fn transition(&self, pid: Pid, state: State) -> String {
        format!("{}:transition:{}", self.pid(pid), state.as_str())
    }

    pub fn requested_at(&self, pid: Pid) -> String {
        format!("{}:requested_at", self.pid(pid))
    }

    pub fn started_at(&self, pid: Pid) -> String {
        format!("{}:started_at", self.pid(pid))
    }

    pub fn finished_at(&self, pid: Pid) -> String {
        format!("{}:finished_at", self.pid(pid))
    }

    /// Rolling window of recent run durations, most recent first.
    pub fn recent_time_to_complete(&self) -> String {
        format!("{}:metrics:recent_time_to_complete", self.namespace)
    }

    pub fn result_cache(&self, result_key: &str) -> String {
        format!("{}:result:{}", self.namespace, result_key)
    }

    pub fn lock(&self, result_key: &str) -> String {
        format!("lock.{}", self.result_cache(result_key))
    }

    pub fn queue(&self, lane: &str) -> String {
        format!("{}:queue:{}", self.namespace, lane)
    }

    pub fn delayed_queue(&self, lane: &str) -> String {
        format!("{}:queue:{}:delayed", self.namespace, lane)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_NAMESPACE)
    }
}
