//! In-process work queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::WorkQueue;
use crate::error::Result;
use crate::worker::WorkUnit;

#[derive(Debug, Default)]
struct Lanes {
    ready: HashMap<String, VecDeque<WorkUnit>>,
    delayed: Vec<(Instant, String, WorkUnit)>,
}

impl Lanes {
    /// Move due delayed units of `lane` to its ready list, in due order.
    fn promote(&mut self, lane: &str, now: Instant) {
        let mut due = Vec::new();
        self.delayed.retain(|(at, l, unit)| {
            if l == lane && *at <= now {
                due.push((*at, unit.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        let ready = self.ready.entry(lane.to_string()).or_default();
        ready.extend(due.into_iter().map(|(_, unit)| unit));
    }
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    lanes: Mutex<Lanes>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units still waiting for their delay to pass.
    pub fn delayed_len(&self, lane: &str) -> usize {
        let lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.delayed.iter().filter(|(_, l, _)| l == lane).count()
    }
}

impl WorkQueue for MemoryQueue {
    fn push(&self, lane: &str, unit: &WorkUnit) -> Result<()> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes
            .ready
            .entry(lane.to_string())
            .or_default()
            .push_back(unit.clone());
        Ok(())
    }

    fn push_delayed(&self, lane: &str, unit: &WorkUnit, delay: Duration) -> Result<()> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes
            .delayed
            .push((Instant::now() + delay, lane.to_string(), unit.clone()));
        Ok(())
    }

    fn pop(&self, lane: &str) -> Result<Option<WorkUnit>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.promote(lane, Instant::now());
        Ok(lanes.ready.get_mut(lane).and_then(VecDeque::pop_front))
    }

    fn peek(&self, lane: &str) -> Result<Vec<WorkUnit>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.promote(lane, Instant::now());
        Ok(lanes
            .ready
            .get(lane)
            .map(|units| units.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn len(&self, lane: &str) -> Result<usize> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.promote(lane, Instant::now());
        Ok(lanes.ready.get(lane).map_or(0, VecDeque::len))
    }

    fn remove_matching(
        &self,
        lane: &str,
        predicate: &dyn Fn(&WorkUnit) -> bool,
    ) -> Result<usize> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        if let Some(units) = lanes.ready.get_mut(lane) {
            let before = units.len();
            units.retain(|unit| !predicate(unit));
            removed += before - units.len();
        }
        let before = lanes.delayed.len();
        lanes
            .delayed
            .retain(|(_, l, unit)| !(l == lane && predicate(unit)));
        removed += before - lanes.delayed.len();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_unit(pid: u64, chunk: &str) -> WorkUnit {
        WorkUnit::Map {
            pid,
            chunk: chunk.to_string(),
        }
    }

    #[test]
    fn lanes_are_fifo_and_independent() {
        let queue = MemoryQueue::new();
        queue.push("a", &map_unit(1, "0")).unwrap();
        queue.push("a", &map_unit(1, "1")).unwrap();
        queue.push("b", &WorkUnit::Finalize { pid: 2 }).unwrap();
        assert_eq!(queue.len("a").unwrap(), 2);
        assert_eq!(queue.pop("a").unwrap(), Some(map_unit(1, "0")));
        assert_eq!(queue.pop("b").unwrap(), Some(WorkUnit::Finalize { pid: 2 }));
        assert_eq!(queue.pop("b").unwrap(), None);
        assert_eq!(queue.peek("a").unwrap(), vec![map_unit(1, "1")]);
    }

    #[test]
    fn delayed_units_wait_until_due() {
        let queue = MemoryQueue::new();
        let unit = WorkUnit::Reduce {
            pid: 1,
            key: "x".into(),
        };
        queue
            .push_delayed("q", &unit, Duration::from_secs(3600))
            .unwrap();
        assert_eq!(queue.pop("q").unwrap(), None);
        assert_eq!(queue.delayed_len("q"), 1);

        queue.push_delayed("q", &unit, Duration::ZERO).unwrap();
        assert_eq!(queue.pop("q").unwrap(), Some(unit));
        assert_eq!(queue.delayed_len("q"), 1);
    }

    #[test]
    fn remove_matching_covers_ready_and_delayed_units() {
        let queue = MemoryQueue::new();
        queue.push("q", &map_unit(1, "0")).unwrap();
        queue.push("q", &map_unit(2, "0")).unwrap();
        queue.push("q", &map_unit(1, "1")).unwrap();
        queue
            .push_delayed("q", &map_unit(1, "2"), Duration::from_secs(60))
            .unwrap();
        queue.push("other", &map_unit(1, "3")).unwrap();

        let removed = queue.remove_matching("q", &|unit| unit.pid() == 1).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(queue.peek("q").unwrap(), vec![map_unit(2, "0")]);
        assert_eq!(queue.delayed_len("q"), 0);
        assert_eq!(queue.len("other").unwrap(), 1);
    }
}
