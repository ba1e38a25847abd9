//! Scheduling.
//!
//! There is no long-lived master: these functions are re-entered by whichever
//! worker frees the last outstanding unit of a phase. All bookkeeping lives
//! in the store.
//!
//! Outstanding units ("slaves") are counted with a list per process: one
//! element per unit, pushed when the unit is assigned and popped when it is
//! freed.

use itertools::Itertools;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::process::{Input, Pid, Process, State};
use crate::worker::{self, WorkUnit};

/// Split `input` into contiguous chunks of at most `size` elements.
pub fn partition<T: Clone>(input: &[T], size: usize) -> Vec<Vec<T>> {
    input
        .chunks(size.max(1))
        .filter(|chunk| !chunk.is_empty())
        .map(<[T]>::to_vec)
        .collect()
}

/// Run `process`. Synchronous processes go through every phase inline;
/// asynchronous ones are moved into the map phase, which queues the input unit.
pub fn mapreduce(process: &mut Process) -> Result<()> {
    if process.spec().synchronous {
        run_inline(process)
    } else {
        process.next_state()?;
        Ok(())
    }
}

fn run_inline(process: &mut Process) -> Result<()> {
    let pid = process.pid();
    for state in [
        State::MapInProgress,
        State::ReduceInProgress,
        State::FinalizerInProgress,
    ] {
        process.update(|spec| spec.state = state)?;
        info!(pid, state = %state, "Entering phase");
        enter_phase(process, state)?;
    }
    process.update(|spec| spec.state = State::Complete)?;
    info!(pid, "Process complete");
    Ok(())
}

/// Schedule the units of the phase `state` starts.
pub fn enter_phase(process: &Process, state: State) -> Result<()> {
    match state {
        State::MapInProgress => enslave(process, WorkUnit::Input { pid: process.pid() }),
        State::ReduceInProgress => enslave_reducers(process),
        State::FinalizerInProgress => enslave_finalizer(process),
        State::NotStarted | State::Complete => Ok(()),
    }
}

/// Assign a unit and run it inline (synchronous) or queue it.
pub fn enslave(process: &Process, unit: WorkUnit) -> Result<()> {
    let ctx = process.context();
    assign_slave(ctx, process.pid())?;
    if process.spec().synchronous {
        return worker::execute(ctx, unit);
    }
    let lane = worker::lane(ctx, process.spec(), &unit)?;
    if let Err(err) = ctx.queue.push(&lane, &unit) {
        free_slave(ctx, process.pid())?;
        return Err(err);
    }
    debug!(pid = process.pid(), lane = %lane, kind = unit.kind(), "Enslaved");
    Ok(())
}

/// Like [`enslave`], but the unit only becomes runnable after `delay`.
/// Synchronous processes have no queue to delay, so the unit runs at once.
pub fn enslave_later(process: &Process, unit: WorkUnit, delay: Duration) -> Result<()> {
    let ctx = process.context();
    assign_slave(ctx, process.pid())?;
    if process.spec().synchronous {
        return worker::execute(ctx, unit);
    }
    let lane = worker::lane(ctx, process.spec(), &unit)?;
    if let Err(err) = ctx.queue.push_delayed(&lane, &unit, delay) {
        free_slave(ctx, process.pid())?;
        return Err(err);
    }
    debug!(pid = process.pid(), lane = %lane, kind = unit.kind(), ?delay, "Enslaved later");
    Ok(())
}

/// Schedule one map unit per input chunk. Run by the input unit.
pub fn enslave_mappers(process: &Process) -> Result<()> {
    let ctx = process.context();
    let pid = process.pid();
    start_metrics(process)?;

    let input = process
        .input()?
        .ok_or_else(|| Error::configuration(format!("process {} has no input", pid)))?;
    let mut chunks = 0;
    let mut schedule = |chunk_key: String, records: Vec<String>| -> Result<()> {
        let location = ctx.keys.chunk(pid, &chunk_key);
        ctx.store.del(&location)?;
        for record in &records {
            ctx.store.rpush(&location, record)?;
        }
        chunks += 1;
        enslave(process, WorkUnit::Map { pid, chunk: chunk_key })
    };

    match input {
        Input::Records(records) => {
            let mapper = ctx.registry.mapper(&process.spec().mapper)?;
            let size = mapper
                .partition_size()
                .unwrap_or(ctx.config.partition_size);
            for (idx, chunk) in partition(&records, size).into_iter().enumerate() {
                schedule(idx.to_string(), chunk)?;
            }
        }
        Input::Reference(data) => {
            let name = process.spec().inputter.as_deref().ok_or_else(|| {
                Error::configuration(format!("process {} has no inputter", pid))
            })?;
            let inputter = ctx.registry.inputter(name)?;
            inputter.scan(ctx.store.as_ref(), &data, &mut schedule)?;
        }
    }
    info!(pid, chunks, "Enslaved mappers");
    Ok(())
}

/// Schedule one reduce unit per intermediate key.
pub fn enslave_reducers(process: &Process) -> Result<()> {
    let pid = process.pid();
    let keys = process.map_keys()?;
    info!(pid, keys = keys.len(), "Enslaving reducers");
    for key in keys {
        enslave(process, WorkUnit::Reduce { pid, key })?;
    }
    Ok(())
}

pub fn enslave_finalizer(process: &Process) -> Result<()> {
    enslave(process, WorkUnit::Finalize { pid: process.pid() })
}

/// Retry a reduce unit after the configured wait.
pub fn enslave_later_reduce(process: &Process, key: &str) -> Result<()> {
    let delay = process.context().config.reduce_retry_wait;
    let unit = WorkUnit::Reduce {
        pid: process.pid(),
        key: key.to_string(),
    };
    enslave_later(process, unit, delay)
}

pub fn assign_slave(ctx: &Arc<Context>, pid: Pid) -> Result<()> {
    ctx.store.rpush(&ctx.keys.slaves(pid), "1")?;
    Ok(())
}

pub fn free_slave(ctx: &Arc<Context>, pid: Pid) -> Result<()> {
    ctx.store.lpop(&ctx.keys.slaves(pid))?;
    Ok(())
}

/// Number of outstanding units.
pub fn slaves(ctx: &Arc<Context>, pid: Pid) -> Result<usize> {
    ctx.store.llen(&ctx.keys.slaves(pid))
}

pub fn working(ctx: &Arc<Context>, pid: Pid) -> Result<bool> {
    Ok(slaves(ctx, pid)? > 0)
}

/// Remove the queued units of `pid` and clear its slave counter.
///
/// Best effort: units already taken by a worker still run. Scans every lane
/// the process's implementations use. Returns the number of units removed.
pub fn emancipate(ctx: &Arc<Context>, pid: Pid) -> Result<usize> {
    let process = match Process::open(ctx, pid)? {
        Some(process) => process,
        None => return Ok(0),
    };
    let samples = [
        WorkUnit::Input { pid },
        WorkUnit::Map {
            pid,
            chunk: String::new(),
        },
        WorkUnit::Reduce {
            pid,
            key: String::new(),
        },
        WorkUnit::Finalize { pid },
    ];
    let mut lanes = Vec::new();
    for unit in &samples {
        match worker::lane(ctx, process.spec(), unit) {
            Ok(lane) => lanes.push(lane),
            Err(err) => warn!(pid, kind = unit.kind(), "No lane to scan: {}", err),
        }
    }

    let mut removed = 0;
    for lane in lanes.into_iter().unique() {
        removed += ctx.queue.remove_matching(&lane, &|unit| unit.pid() == pid)?;
    }
    ctx.store.del(&ctx.keys.slaves(pid))?;
    info!(pid, removed, "Emancipated process");
    Ok(removed)
}

/////////////////////////////////////////////////////////////////////////////
// Metrics
/////////////////////////////////////////////////////////////////////////////

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn stamp(ctx: &Arc<Context>, key: &str) -> Result<u64> {
    let now = now_millis();
    ctx.store.set(key, &now.to_string(), None)?;
    Ok(now)
}

pub fn set_request_time(process: &Process) -> Result<()> {
    let ctx = process.context();
    stamp(ctx, &ctx.keys.requested_at(process.pid()))?;
    Ok(())
}

pub fn start_metrics(process: &Process) -> Result<()> {
    let ctx = process.context();
    stamp(ctx, &ctx.keys.started_at(process.pid()))?;
    Ok(())
}

/// Record the finish time, push the run duration onto the rolling window
/// and let the raw timestamps expire.
pub fn finish_metrics(process: &Process) -> Result<()> {
    let ctx = process.context();
    let pid = process.pid();
    let finished = stamp(ctx, &ctx.keys.finished_at(pid))?;

    let started = ctx
        .store
        .get(&ctx.keys.started_at(pid))?
        .and_then(|raw| raw.parse::<u64>().ok());
    if let Some(started) = started {
        let took = finished.saturating_sub(started);
        let window = ctx.keys.recent_time_to_complete();
        ctx.store.lpush(&window, &took.to_string())?;
        ctx.store
            .ltrim(&window, 0, ctx.config.metrics_window as isize - 1)?;
        info!(pid, took_ms = took, "Process finished");
    }

    for key in [
        ctx.keys.requested_at(pid),
        ctx.keys.started_at(pid),
        ctx.keys.finished_at(pid),
    ] {
        ctx.store.expire(&key, ctx.config.metrics_ttl)?;
    }
    Ok(())
}

/// Durations of the most recent runs, newest first.
pub fn recent_run_times(ctx: &Arc<Context>) -> Result<Vec<Duration>> {
    let raw = ctx
        .store
        .lrange(&ctx.keys.recent_time_to_complete(), 0, -1)?;
    Ok(raw
        .iter()
        .filter_map(|ms| ms.parse().ok())
        .map(Duration::from_millis)
        .collect())
}
