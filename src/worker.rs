//! Units of work and the phase workers that execute them.
//!
//! A [`WorkUnit`] names a worker kind and carries its arguments; it is what
//! travels through the queue. [`execute`] loads the unit's process, runs the
//! user implementation and does the bookkeeping around it: however the unit
//! ends, its slave is freed and the process is offered a state transition.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::Result;
use crate::master;
use crate::process::{Pid, Process, ProcessSpec};
use crate::store::KeyValueStore;
use crate::KeyValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "worker", rename_all = "snake_case")]
pub enum WorkUnit {
    /// Scan or partition the input and schedule the map units.
    Input { pid: Pid },
    /// Map one stored input chunk.
    Map { pid: Pid, chunk: String },
    /// Reduce the values of one intermediate key.
    Reduce { pid: Pid, key: String },
    Finalize { pid: Pid },
}

impl WorkUnit {
    pub fn pid(&self) -> Pid {
        match self {
            WorkUnit::Input { pid }
            | WorkUnit::Map { pid, .. }
            | WorkUnit::Reduce { pid, .. }
            | WorkUnit::Finalize { pid } => *pid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkUnit::Input { .. } => "input",
            WorkUnit::Map { .. } => "map",
            WorkUnit::Reduce { .. } => "reduce",
            WorkUnit::Finalize { .. } => "finalize",
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
// Worker contracts
/////////////////////////////////////////////////////////////////////////////

/// Turns an input reference into chunks of records.
pub trait Inputter: Send + Sync {
    /// Lane this worker's units are queued on; the configured default if `None`.
    fn queue(&self) -> Option<&str> {
        None
    }

    /// Call `emit(chunk_key, records)` once per chunk of the data behind `data_ref`.
    fn scan(
        &self,
        store: &dyn KeyValueStore,
        data_ref: &str,
        emit: &mut dyn FnMut(String, Vec<String>) -> Result<()>,
    ) -> Result<()>;
}

/// Receives the intermediate pairs of a mapper.
pub trait MapSink {
    fn emit(&mut self, key: &str, value: &str) -> Result<()>;

    fn emit_ranked(&mut self, rank: f64, key: &str, value: &str) -> Result<()>;
}

pub trait Mapper: Send + Sync {
    fn queue(&self) -> Option<&str> {
        None
    }

    /// Chunk size used when the master partitions records directly.
    fn partition_size(&self) -> Option<usize> {
        None
    }

    fn map(&self, records: &[String], sink: &mut dyn MapSink) -> Result<()>;
}

/// Receives the reduced values of one key.
pub trait ReduceSink {
    fn emit(&mut self, value: &str) -> Result<()>;
}

pub trait Reducer: Send + Sync {
    fn queue(&self) -> Option<&str> {
        None
    }

    /// Reduce every map value of one key.
    ///
    /// Returning [`Error::Recoverable`](crate::Error::Recoverable) schedules
    /// a delayed retry of the key instead of failing the unit.
    fn reduce(&self, values: Vec<String>, sink: &mut dyn ReduceSink) -> Result<()>;

    /// Reduce `key` of `process`. Reducers that do not need the values in
    /// memory can override this.
    fn reduce_perform(&self, process: &Process, key: &str) -> Result<()> {
        let values = process.map_values(key)?;
        let mut sink = ReducedSink { process, key };
        self.reduce(values, &mut sink)
    }
}

pub trait Finalizer: Send + Sync {
    fn queue(&self) -> Option<&str> {
        None
    }

    /// Runs once after every key is reduced; usually ends in
    /// [`Process::save_result`].
    fn finalize(&self, process: &Process) -> Result<()>;
}

/// Encoding of final results in the result cache.
pub trait Outputter: Send + Sync {
    fn encode(&self, value: &serde_json::Value) -> Result<String>;

    fn decode(&self, raw: &str) -> Result<serde_json::Value>;
}

/// Wires map output into a process's key space.
struct IntermediateSink<'a> {
    process: &'a Process,
}

impl MapSink for IntermediateSink<'_> {
    fn emit(&mut self, key: &str, value: &str) -> Result<()> {
        self.process.emit_intermediate(key, value)
    }

    fn emit_ranked(&mut self, rank: f64, key: &str, value: &str) -> Result<()> {
        self.process.emit_intermediate_ranked(rank, key, value)
    }
}

/// Wires reduce output for one key into a process's key space.
struct ReducedSink<'a> {
    process: &'a Process,
    key: &'a str,
}

impl ReduceSink for ReducedSink<'_> {
    fn emit(&mut self, value: &str) -> Result<()> {
        self.process.emit(self.key, value)
    }
}

/// Collects map output in memory; ranks are dropped.
impl MapSink for Vec<KeyValue> {
    fn emit(&mut self, key: &str, value: &str) -> Result<()> {
        self.push(KeyValue::new(key, value));
        Ok(())
    }

    fn emit_ranked(&mut self, _rank: f64, key: &str, value: &str) -> Result<()> {
        MapSink::emit(self, key, value)
    }
}

impl ReduceSink for Vec<String> {
    fn emit(&mut self, value: &str) -> Result<()> {
        self.push(value.to_string());
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////
// Execution
/////////////////////////////////////////////////////////////////////////////

/// The lane `unit` is queued on for a process described by `spec`.
pub fn lane(ctx: &Context, spec: &ProcessSpec, unit: &WorkUnit) -> Result<String> {
    let registry = &ctx.registry;
    let lane = match unit {
        WorkUnit::Input { .. } => match &spec.inputter {
            Some(name) => registry.inputter(name)?.queue().map(str::to_string),
            None => None,
        },
        WorkUnit::Map { .. } => registry.mapper(&spec.mapper)?.queue().map(str::to_string),
        WorkUnit::Reduce { .. } => registry.reducer(&spec.reducer)?.queue().map(str::to_string),
        WorkUnit::Finalize { .. } => registry
            .finalizer(&spec.finalizer)?
            .queue()
            .map(str::to_string),
    };
    Ok(lane.unwrap_or_else(|| ctx.config.default_queue.clone()))
}

/// Frees the unit's slave and attempts a state transition when dropped.
struct SlaveGuard<'a> {
    process: &'a Process,
}

impl Drop for SlaveGuard<'_> {
    fn drop(&mut self) {
        let pid = self.process.pid();
        if let Err(err) = master::free_slave(self.process.context(), pid) {
            warn!(pid, "Failed to free slave: {}", err);
        }
        if let Err(err) = self.process.next_state() {
            warn!(pid, "Failed to advance state: {}", err);
        }
    }
}

/// Run one unit. Units of processes that no longer exist are dropped.
pub fn execute(ctx: &Arc<Context>, unit: WorkUnit) -> Result<()> {
    let process = match Process::open(ctx, unit.pid())? {
        Some(process) => process,
        None => {
            debug!(pid = unit.pid(), kind = unit.kind(), "Dropping unit of a missing process");
            return Ok(());
        }
    };
    match unit {
        WorkUnit::Input { .. } => perform_input(&process),
        WorkUnit::Map { chunk, .. } => perform_map(&process, &chunk),
        WorkUnit::Reduce { key, .. } => perform_reduce(&process, &key),
        WorkUnit::Finalize { .. } => perform_finalize(&process),
    }
}

fn perform_input(process: &Process) -> Result<()> {
    let _guard = SlaveGuard { process };
    master::enslave_mappers(process)
}

fn perform_map(process: &Process, chunk: &str) -> Result<()> {
    let _guard = SlaveGuard { process };
    let ctx = process.context();
    let mapper = ctx.registry.mapper(&process.spec().mapper)?;
    let records = ctx
        .store
        .lrange(&ctx.keys.chunk(process.pid(), chunk), 0, -1)?;
    let mut sink = IntermediateSink { process };
    mapper.map(&records, &mut sink)?;
    debug!(pid = process.pid(), chunk, records = records.len(), "Mapped chunk");
    Ok(())
}

fn perform_reduce(process: &Process, key: &str) -> Result<()> {
    // Dropped on return, so a retry is assigned before this unit is freed.
    let _guard = SlaveGuard { process };
    let ctx = process.context();
    let reducer = ctx.registry.reducer(&process.spec().reducer)?;
    match reducer.reduce_perform(process, key) {
        Err(err) if err.is_recoverable() => {
            warn!(pid = process.pid(), key, "Retrying reduce: {}", err);
            master::enslave_later_reduce(process, key)
        }
        other => other,
    }
}

fn perform_finalize(process: &Process) -> Result<()> {
    let _guard = SlaveGuard { process };
    let ctx = process.context();
    let finalizer = ctx.registry.finalizer(&process.spec().finalizer)?;
    finalizer.finalize(process)?;
    master::finish_metrics(process)?;
    info!(pid = process.pid(), "Finalized");
    Ok(())
}

/// Pop and execute one unit of `lane`. Execution failures are logged, not
/// returned; queue failures are returned.
pub fn work_one(ctx: &Arc<Context>, lane: &str) -> Result<Option<WorkUnit>> {
    let unit = match ctx.queue.pop(lane)? {
        Some(unit) => unit,
        None => return Ok(None),
    };
    debug!(lane, pid = unit.pid(), kind = unit.kind(), "Working");
    if let Err(err) = execute(ctx, unit.clone()) {
        error!(lane, pid = unit.pid(), kind = unit.kind(), "Unit failed: {}", err);
    }
    Ok(Some(unit))
}

/// Work every ready unit of `lanes` until all of them are empty. Returns the
/// number of units worked.
pub fn work_off(ctx: &Arc<Context>, lanes: &[String]) -> Result<usize> {
    let mut worked = 0;
    loop {
        let before = worked;
        for lane in lanes {
            while work_one(ctx, lane)?.is_some() {
                worked += 1;
            }
        }
        if worked == before {
            return Ok(worked);
        }
    }
}
