//! Redis work queue.
//!
//! A lane is a list of JSON-encoded units. Delayed units wait in a sorted set
//! next to the lane, scored by their due time in milliseconds since the epoch.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

use super::WorkQueue;
use crate::error::Result;
use crate::keys::KeySpace;
use crate::store::RedisStore;
use crate::worker::WorkUnit;

/// A delayed unit. The nonce keeps identical units distinct in the sorted set.
#[derive(Serialize, Deserialize)]
struct Delayed {
    unit: WorkUnit,
    nonce: Uuid,
}

pub struct RedisQueue {
    store: RedisStore,
    keys: KeySpace,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RedisQueue {
    pub fn connect(url: &str, namespace: &str) -> Result<Self> {
        Ok(Self {
            store: RedisStore::connect(url)?,
            keys: KeySpace::new(namespace),
        })
    }

    fn promote(&self, lane: &str) -> Result<()> {
        let delayed = self.keys.delayed_queue(lane);
        let due: Vec<String> =
            self.store
                .query("ZRANGEBYSCORE", &[&delayed, &"-inf", &now_millis()])?;
        for raw in due {
            // Only the worker whose ZREM succeeds moves the unit.
            let removed: i64 = self.store.query("ZREM", &[&delayed, &raw])?;
            if removed != 1 {
                continue;
            }
            let entry: Delayed = serde_json::from_str(&raw)?;
            let encoded = serde_json::to_string(&entry.unit)?;
            let _: i64 = self
                .store
                .query("RPUSH", &[&self.keys.queue(lane), &encoded])?;
            debug!(lane, unit = %encoded, "Promoted delayed unit");
        }
        Ok(())
    }

    fn decode(lane: &str, raw: &str) -> Option<WorkUnit> {
        match serde_json::from_str(raw) {
            Ok(unit) => Some(unit),
            Err(err) => {
                warn!(lane, raw, "Dropping undecodable unit: {}", err);
                None
            }
        }
    }
}

impl WorkQueue for RedisQueue {
    fn push(&self, lane: &str, unit: &WorkUnit) -> Result<()> {
        let encoded = serde_json::to_string(unit)?;
        let _: i64 = self
            .store
            .query("RPUSH", &[&self.keys.queue(lane), &encoded])?;
        Ok(())
    }

    fn push_delayed(&self, lane: &str, unit: &WorkUnit, delay: Duration) -> Result<()> {
        let entry = Delayed {
            unit: unit.clone(),
            nonce: Uuid::new_v4(),
        };
        let encoded = serde_json::to_string(&entry)?;
        let due = now_millis() + delay.as_millis() as u64;
        let _: i64 = self
            .store
            .query("ZADD", &[&self.keys.delayed_queue(lane), &due, &encoded])?;
        Ok(())
    }

    fn pop(&self, lane: &str) -> Result<Option<WorkUnit>> {
        self.promote(lane)?;
        loop {
            let raw: Option<String> = self.store.query("LPOP", &[&self.keys.queue(lane)])?;
            match raw {
                Some(raw) => {
                    if let Some(unit) = Self::decode(lane, &raw) {
                        return Ok(Some(unit));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn peek(&self, lane: &str) -> Result<Vec<WorkUnit>> {
        self.promote(lane)?;
        let raw: Vec<String> = self
            .store
            .query("LRANGE", &[&self.keys.queue(lane), &0, &-1])?;
        Ok(raw.iter().filter_map(|r| Self::decode(lane, r)).collect())
    }

    fn len(&self, lane: &str) -> Result<usize> {
        self.promote(lane)?;
        self.store.query("LLEN", &[&self.keys.queue(lane)])
    }

    fn remove_matching(
        &self,
        lane: &str,
        predicate: &dyn Fn(&WorkUnit) -> bool,
    ) -> Result<usize> {
        let mut removed = 0;

        let ready_key = self.keys.queue(lane);
        let ready: Vec<String> = self.store.query("LRANGE", &[&ready_key, &0, &-1])?;
        for raw in ready {
            if Self::decode(lane, &raw).is_some_and(|unit| predicate(&unit)) {
                let n: usize = self.store.query("LREM", &[&ready_key, &1, &raw])?;
                removed += n;
            }
        }

        let delayed_key = self.keys.delayed_queue(lane);
        let delayed: Vec<String> = self.store.query("ZRANGE", &[&delayed_key, &0, &-1])?;
        for raw in delayed {
            let matches = serde_json::from_str::<Delayed>(&raw)
                .map(|entry| predicate(&entry.unit))
                .unwrap_or(false);
            if matches {
                let n: usize = self.store.query("ZREM", &[&delayed_key, &raw])?;
                removed += n;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "needs a running redis server"]
    fn delayed_unit_is_promoted_once_due() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/15".into());
        let ns = format!("kvmr-test-{}", Uuid::new_v4());
        let queue = RedisQueue::connect(&url, &ns).unwrap();
        let unit = WorkUnit::Reduce {
            pid: 4,
            key: "x".into(),
        };
        queue.push_delayed("q", &unit, Duration::ZERO).unwrap();
        queue.push("q", &WorkUnit::Finalize { pid: 5 }).unwrap();
        assert_eq!(queue.remove_matching("q", &|u| u.pid() == 5).unwrap(), 1);
        assert_eq!(queue.pop("q").unwrap(), Some(unit));
        assert_eq!(queue.pop("q").unwrap(), None);
    }
}
