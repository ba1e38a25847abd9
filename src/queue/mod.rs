//! Work queue abstraction: durable FIFO lanes of [`WorkUnit`]s.

use std::time::Duration;

use crate::error::Result;
use crate::worker::WorkUnit;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryQueue;
#[cfg(feature = "redis")]
pub use self::redis::RedisQueue;

pub trait WorkQueue: Send + Sync {
    fn push(&self, lane: &str, unit: &WorkUnit) -> Result<()>;

    /// Make `unit` poppable from `lane` once `delay` has passed.
    fn push_delayed(&self, lane: &str, unit: &WorkUnit, delay: Duration) -> Result<()>;

    /// Take the oldest unit of `lane`. Delayed units that are due are moved
    /// to the lane first.
    fn pop(&self, lane: &str) -> Result<Option<WorkUnit>>;

    /// The ready units of `lane`, oldest first, without removing them.
    fn peek(&self, lane: &str) -> Result<Vec<WorkUnit>>;

    /// Number of ready units in `lane`.
    fn len(&self, lane: &str) -> Result<usize>;

    /// Remove every unit of `lane` (ready or delayed) matching `predicate`.
    /// Returns the number removed.
    fn remove_matching(&self, lane: &str, predicate: &dyn Fn(&WorkUnit) -> bool)
        -> Result<usize>;
}
