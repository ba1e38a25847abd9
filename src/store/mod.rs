//! Key-value store abstraction.
//!
//! The store is the only shared memory between workers. Every mutation the
//! engine performs is a single atomic operation on one key; no cross-key
//! transactions are assumed.

use std::time::Duration;

use crate::error::Result;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Operations the engine needs from a key-value backend.
///
/// List and sorted-set ranges use Redis index semantics: inclusive bounds,
/// negative indices count from the end.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Set `key` only if it does not exist. Returns whether it was set.
    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Returns whether the key existed.
    fn del(&self, key: &str) -> Result<bool>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically add `by` to an integer value, creating it at 0. Returns the new value.
    fn incr_by(&self, key: &str, by: i64) -> Result<i64>;

    /// Returns whether the key existed.
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining time to live; `None` if the key is missing or persistent.
    fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Append to a list. Returns the new length.
    fn rpush(&self, key: &str, value: &str) -> Result<usize>;

    /// Prepend to a list. Returns the new length.
    fn lpush(&self, key: &str, value: &str) -> Result<usize>;

    fn lpop(&self, key: &str) -> Result<Option<String>>;

    fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    fn llen(&self, key: &str) -> Result<usize>;

    fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<()>;

    /// Returns whether the member was newly added.
    fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    fn srem(&self, key: &str, member: &str) -> Result<bool>;

    fn smembers(&self, key: &str) -> Result<Vec<String>>;

    fn scard(&self, key: &str) -> Result<usize>;

    /// Add or re-score a member. Returns whether the member was newly added.
    fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool>;

    /// Members in ascending score order.
    fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    fn zcard(&self, key: &str) -> Result<usize>;

    /// Keys matching a glob-style pattern (`*`, `?`, `[...]`).
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Resolve Redis-style inclusive `[start, stop]` indices against a length.
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_range;

    #[test]
    fn full_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
    }

    #[test]
    fn clamps_past_the_end() {
        assert_eq!(resolve_range(3, 1, 100), Some((1, 2)));
    }

    #[test]
    fn empty_or_inverted_ranges() {
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(4, 3, 1), None);
        assert_eq!(resolve_range(4, 9, 12), None);
    }

    #[test]
    fn negative_start() {
        assert_eq!(resolve_range(4, -2, -1), Some((2, 3)));
        assert_eq!(resolve_range(4, -10, 1), Some((0, 1)));
    }
}
