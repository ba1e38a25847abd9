//! Process descriptors.
//!
//! A [`Process`] is one MapReduce run: a persisted [`ProcessSpec`], a pid,
//! and the intermediate key space its workers write into. Handles are cheap
//! to clone and hold no state beyond a snapshot of their `ProcessSpec`, so any
//! worker can rebuild one with [`Process::open`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::master;

/// Process id, allocated from an atomic counter.
pub type Pid = u64;

/// Phase of a run. Transitions only ever move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    #[default]
    NotStarted,
    MapInProgress,
    ReduceInProgress,
    FinalizerInProgress,
    Complete,
}

impl State {
    /// The state entered after this one; `None` once complete.
    pub fn next(self) -> Option<State> {
        match self {
            State::NotStarted => Some(State::MapInProgress),
            State::MapInProgress => Some(State::ReduceInProgress),
            State::ReduceInProgress => Some(State::FinalizerInProgress),
            State::FinalizerInProgress => Some(State::Complete),
            State::Complete => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::NotStarted => "NOT_STARTED",
            State::MapInProgress => "MAP_IN_PROGRESS",
            State::ReduceInProgress => "REDUCE_IN_PROGRESS",
            State::FinalizerInProgress => "FINALIZER_IN_PROGRESS",
            State::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted description of a process. Implementations are referenced
/// by their registry names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSpec {
    pub inputter: Option<String>,
    pub mapper: String,
    pub reducer: String,
    pub finalizer: String,
    pub outputter: String,
    /// Keys carry an explicit rank and `map_keys` returns them in rank order.
    pub ordered: bool,
    /// Phases run inline in the caller of `run` instead of through the queue.
    pub synchronous: bool,
    /// Result cache TTL. Filled from `Config::result_timeout` on create.
    #[serde(with = "humantime_serde")]
    pub result_timeout: Option<Duration>,
    /// Values the result cache location is derived from.
    pub key_args: Vec<String>,
    pub state: State,
    #[serde(rename = "type")]
    pub process_type: String,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self {
            inputter: Some("word_stream".to_string()),
            mapper: "word_counter".to_string(),
            reducer: "adder".to_string(),
            finalizer: "to_hash".to_string(),
            outputter: "json".to_string(),
            ordered: false,
            synchronous: false,
            result_timeout: None,
            key_args: Vec::new(),
            state: State::NotStarted,
            process_type: "process".to_string(),
        }
    }
}

/// What a process runs over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Records partitioned directly by the master.
    Records(Vec<String>),
    /// An opaque reference handed to the process's inputter.
    Reference(String),
}

impl From<Vec<String>> for Input {
    fn from(records: Vec<String>) -> Self {
        Input::Records(records)
    }
}

impl From<&[&str]> for Input {
    fn from(records: &[&str]) -> Self {
        Input::Records(records.iter().map(|r| r.to_string()).collect())
    }
}

/// Handle to a persisted process.
#[derive(Clone)]
pub struct Process {
    pid: Pid,
    spec: ProcessSpec,
    ctx: Arc<Context>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("spec", &self.spec)
            .finish()
    }
}

impl Process {
    /// Allocate a pid, persist `spec` and register the process.
    ///
    /// Every implementation `spec` names must be registered.
    pub fn create(ctx: &Arc<Context>, mut spec: ProcessSpec) -> Result<Process> {
        ctx.registry.validate(&spec)?;
        spec.result_timeout.get_or_insert(ctx.config.result_timeout);
        let pid = ctx.store.incr_by(&ctx.keys.processes_count(), 1)?;
        let pid = Pid::try_from(pid)
            .map_err(|_| Error::store(format!("process counter went negative: {}", pid)))?;
        let process = Process {
            pid,
            spec,
            ctx: Arc::clone(ctx),
        };
        process.save()?;
        ctx.store.sadd(&ctx.keys.processes(), &pid.to_string())?;
        info!(pid, process_type = %process.spec.process_type, "Created process");
        Ok(process)
    }

    /// Create a process from a named pipeline template.
    pub fn create_from_pipeline(
        ctx: &Arc<Context>,
        name: &str,
        key_args: Vec<String>,
    ) -> Result<Process> {
        let pipeline = ctx.registry.pipeline(name)?;
        let spec = ProcessSpec {
            key_args,
            ..pipeline.spec.clone()
        };
        Self::create(ctx, spec)
    }

    /// Load the process stored under `pid`, if any.
    pub fn open(ctx: &Arc<Context>, pid: Pid) -> Result<Option<Process>> {
        let raw = match ctx.store.get(&ctx.keys.pid(pid))? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let spec = serde_json::from_str(&raw)?;
        Ok(Some(Process {
            pid,
            spec,
            ctx: Arc::clone(ctx),
        }))
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn state(&self) -> State {
        self.spec.state
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Persist the full `ProcessSpec`. Last writer wins.
    pub fn save(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.spec)?;
        self.ctx.store.set(&self.ctx.keys.pid(self.pid), &raw, None)
    }

    /// Apply `change` to the `ProcessSpec` and persist it.
    pub fn update(&mut self, change: impl FnOnce(&mut ProcessSpec)) -> Result<()> {
        change(&mut self.spec);
        self.save()
    }

    /// Refresh the `ProcessSpec` from the store. Returns `false` if the
    /// process no longer exists.
    pub fn reload(&mut self) -> Result<bool> {
        match Process::open(&self.ctx, self.pid)? {
            Some(fresh) => {
                self.spec = fresh.spec;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every key of the process and deregister it.
    ///
    /// With `safe` set, refuses (returning `false`) while units are outstanding.
    pub fn delete(&self, safe: bool) -> Result<bool> {
        let ctx = &self.ctx;
        if safe && master::working(ctx, self.pid)? {
            warn!(pid = self.pid, "Refusing to delete a process with outstanding work");
            return Ok(false);
        }
        let mut removed = 0;
        for pattern in ctx.keys.process_patterns(self.pid) {
            for key in ctx.store.keys(&pattern)? {
                if ctx.store.del(&key)? {
                    removed += 1;
                }
            }
        }
        ctx.store.srem(&ctx.keys.processes(), &self.pid.to_string())?;
        if ctx.store.scard(&ctx.keys.processes())? == 0 {
            ctx.store.del(&ctx.keys.processes_count())?;
        }
        info!(pid = self.pid, keys = removed, "Deleted process");
        Ok(true)
    }

    /// Start the run over `input`.
    ///
    /// Synchronous runs return once the process is complete; asynchronous
    /// runs return once the first unit is queued.
    pub fn run(&mut self, input: impl Into<Input>, synchronous: bool) -> Result<()> {
        let input = input.into();
        if matches!(input, Input::Reference(_)) && self.spec.inputter.is_none() {
            return Err(Error::configuration(format!(
                "process {} has no inputter to scan a data reference",
                self.pid
            )));
        }
        if self.spec.state != State::NotStarted {
            return Err(Error::configuration(format!(
                "process {} was already run (state {})",
                self.pid, self.spec.state
            )));
        }
        let raw = serde_json::to_string(&input)?;
        self.ctx.store.set(&self.ctx.keys.input(self.pid), &raw, None)?;
        self.update(|spec| spec.synchronous = synchronous)?;
        master::set_request_time(self)?;
        info!(pid = self.pid, synchronous, "Running process");
        master::mapreduce(self)
    }

    /// The stored input of the run.
    pub fn input(&self) -> Result<Option<Input>> {
        match self.ctx.store.get(&self.ctx.keys.input(self.pid))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Try to move the process into its next state.
    ///
    /// Only applies to asynchronous processes with no outstanding units.
    /// The persisted state is read before the unit count, and the move out
    /// of a state is claimed with set-if-not-exists, so of several workers
    /// that all observe an idle process exactly one advances it. While the
    /// entry hook of the new state schedules units, the advancing worker
    /// holds one unit of its own, so no scheduled unit can complete the
    /// phase before scheduling is done. Returns the last state entered.
    pub fn next_state(&self) -> Result<Option<State>> {
        let mut process = match Process::open(&self.ctx, self.pid)? {
            Some(process) => process,
            None => return Ok(None),
        };
        if process.spec.synchronous || master::working(&self.ctx, self.pid)? {
            return Ok(None);
        }
        let current = process.spec.state;
        let next = match current.next() {
            Some(next) => next,
            None => return Ok(None),
        };
        let claim = self.ctx.keys.transition(self.pid, current);
        if !self.ctx.store.set_nx(&claim, next.as_str(), None)? {
            debug!(pid = self.pid, state = %current, "Transition already claimed");
            return Ok(None);
        }

        master::assign_slave(&self.ctx, self.pid)?;
        let entered = process
            .update(|spec| spec.state = next)
            .and_then(|_| master::enter_phase(&process, next));
        let freed = master::free_slave(&self.ctx, self.pid);
        entered?;
        freed?;
        info!(pid = self.pid, from = %current, to = %next, "State transition");

        let deeper = process.next_state()?;
        Ok(Some(deeper.unwrap_or(next)))
    }

    /// Whether units are outstanding.
    pub fn is_running(&self) -> Result<bool> {
        master::working(&self.ctx, self.pid)
    }

    /////////////////////////////////////////////////////////////////////////
    // Intermediate key space
    /////////////////////////////////////////////////////////////////////////

    /// Hash `key` and check that its slot belongs to it.
    fn claim_key(&self, key: &str) -> Result<String> {
        let hashed = (self.ctx.hasher)(key);
        let slot = self.ctx.keys.hash_to_key(self.pid, &hashed);
        if self.ctx.store.set_nx(&slot, key, None)? {
            return Ok(hashed);
        }
        match self.ctx.store.get(&slot)? {
            Some(existing) if existing != key => {
                error!(pid = self.pid, key, hashed_key = %hashed, existing = %existing, "Key collision");
                Err(Error::KeyCollision {
                    key: key.to_string(),
                    hashed_key: hashed,
                    existing,
                })
            }
            _ => Ok(hashed),
        }
    }

    /// Record an intermediate `value` for `key`.
    ///
    /// Ordered processes need a rank; use [`Process::emit_intermediate_ranked`].
    pub fn emit_intermediate(&self, key: &str, value: &str) -> Result<()> {
        if self.spec.ordered {
            return Err(Error::configuration(format!(
                "process {} is ordered: emit `{}` with a rank",
                self.pid, key
            )));
        }
        let hashed = self.claim_key(key)?;
        self.ctx.store.sadd(&self.ctx.keys.keys(self.pid), key)?;
        self.ctx
            .store
            .rpush(&self.ctx.keys.map(self.pid, &hashed), value)?;
        Ok(())
    }

    /// Record an intermediate `value` for `key` at `rank`. Unordered processes
    /// ignore the rank.
    pub fn emit_intermediate_ranked(&self, rank: f64, key: &str, value: &str) -> Result<()> {
        let hashed = self.claim_key(key)?;
        let keys = self.ctx.keys.keys(self.pid);
        if self.spec.ordered {
            self.ctx.store.zadd(&keys, rank, key)?;
        } else {
            self.ctx.store.sadd(&keys, key)?;
        }
        self.ctx
            .store
            .rpush(&self.ctx.keys.map(self.pid, &hashed), value)?;
        Ok(())
    }

    /// Record a reduced `value` for `key`.
    pub fn emit(&self, key: &str, value: &str) -> Result<()> {
        let hashed = self.claim_key(key)?;
        self.ctx
            .store
            .rpush(&self.ctx.keys.reduce(self.pid, &hashed), value)?;
        Ok(())
    }

    /// Every emitted key; in rank order when ordered.
    pub fn map_keys(&self) -> Result<Vec<String>> {
        let keys = self.ctx.keys.keys(self.pid);
        if self.spec.ordered {
            self.ctx.store.zrange(&keys, 0, -1)
        } else {
            self.ctx.store.smembers(&keys)
        }
    }

    pub fn num_keys(&self) -> Result<usize> {
        let keys = self.ctx.keys.keys(self.pid);
        if self.spec.ordered {
            self.ctx.store.zcard(&keys)
        } else {
            self.ctx.store.scard(&keys)
        }
    }

    pub fn map_key(&self, key: &str) -> String {
        self.ctx.keys.map(self.pid, &(self.ctx.hasher)(key))
    }

    pub fn reduce_key(&self, key: &str) -> String {
        self.ctx.keys.reduce(self.pid, &(self.ctx.hasher)(key))
    }

    pub fn map_values(&self, key: &str) -> Result<Vec<String>> {
        self.ctx.store.lrange(&self.map_key(key), 0, -1)
    }

    pub fn num_values(&self, key: &str) -> Result<usize> {
        self.ctx.store.llen(&self.map_key(key))
    }

    pub fn reduce_values(&self, key: &str) -> Result<Vec<String>> {
        self.ctx.store.lrange(&self.reduce_key(key), 0, -1)
    }

    /// Visit every key with its reduced values.
    pub fn each_key_reduced_value(
        &self,
        mut f: impl FnMut(&str, Vec<String>) -> Result<()>,
    ) -> Result<()> {
        for key in self.map_keys()? {
            let values = self.reduce_values(&key)?;
            f(&key, values)?;
        }
        Ok(())
    }

    /// Visit every key with its unreduced map values.
    pub fn each_key_nonreduced_value(
        &self,
        mut f: impl FnMut(&str, Vec<String>) -> Result<()>,
    ) -> Result<()> {
        for key in self.map_keys()? {
            let values = self.map_values(&key)?;
            f(&key, values)?;
        }
        Ok(())
    }

    /////////////////////////////////////////////////////////////////////////
    // Result cache
    /////////////////////////////////////////////////////////////////////////

    /// Result cache location for this process's type and key args, followed
    /// by `extra`.
    pub fn result_key(&self, extra: &[&str]) -> String {
        let mut args = self.spec.key_args.clone();
        args.extend(extra.iter().map(|a| a.to_string()));
        let derive = self
            .ctx
            .registry
            .try_pipeline(&self.spec.process_type)
            .map(|p| p.result_key)
            .unwrap_or(crate::workload::default_result_key);
        derive(&self.spec.process_type, &args)
    }

    pub fn result_timeout(&self) -> Duration {
        self.spec
            .result_timeout
            .unwrap_or(self.ctx.config.result_timeout)
    }

    /// Encode `value` with the outputter and cache it for `result_timeout`.
    pub fn save_result(&self, value: &serde_json::Value) -> Result<()> {
        let outputter = self.ctx.registry.outputter(&self.spec.outputter)?;
        let encoded = outputter.encode(value)?;
        let location = self.ctx.keys.result_cache(&self.result_key(&[]));
        self.ctx
            .store
            .set(&location, &encoded, Some(self.result_timeout()))?;
        debug!(pid = self.pid, location = %location, "Saved result");
        Ok(())
    }

    pub fn get_saved_result(&self) -> Result<Option<serde_json::Value>> {
        let location = self.ctx.keys.result_cache(&self.result_key(&[]));
        match self.ctx.store.get(&location)? {
            Some(raw) => {
                let outputter = self.ctx.registry.outputter(&self.spec.outputter)?;
                Ok(Some(outputter.decode(&raw)?))
            }
            None => Ok(None),
        }
    }

    pub fn delete_saved_result(&self) -> Result<bool> {
        let location = self.ctx.keys.result_cache(&self.result_key(&[]));
        self.ctx.store.del(&location)
    }

    /////////////////////////////////////////////////////////////////////////
    // Registry
    /////////////////////////////////////////////////////////////////////////

    /// Registered pids, ascending.
    pub fn ps(ctx: &Arc<Context>) -> Result<Vec<Pid>> {
        let mut pids: Vec<Pid> = ctx
            .store
            .smembers(&ctx.keys.processes())?
            .iter()
            .filter_map(|pid| pid.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    /// Every storage key owned by `pid`.
    pub fn info(ctx: &Arc<Context>, pid: Pid) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for pattern in ctx.keys.process_patterns(pid) {
            keys.extend(ctx.store.keys(&pattern)?);
        }
        keys.sort();
        Ok(keys)
    }

    /// Drop the queued units of `pid` and delete it. Returns the number of
    /// units removed from the queue.
    pub fn kill(ctx: &Arc<Context>, pid: Pid) -> Result<usize> {
        let removed = master::emancipate(ctx, pid)?;
        if let Some(process) = Process::open(ctx, pid)? {
            process.delete(false)?;
        }
        Ok(removed)
    }

    pub fn kill_all(ctx: &Arc<Context>) -> Result<usize> {
        let mut removed = 0;
        for pid in Process::ps(ctx)? {
            removed += Process::kill(ctx, pid)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Arc<Context> {
        Arc::new(Context::in_memory())
    }

    #[test]
    fn states_advance_in_order_and_stop_at_complete() {
        let mut seen = vec![State::NotStarted];
        while let Some(next) = seen[seen.len() - 1].next() {
            seen.push(next);
        }
        assert_eq!(
            seen,
            vec![
                State::NotStarted,
                State::MapInProgress,
                State::ReduceInProgress,
                State::FinalizerInProgress,
                State::Complete
            ]
        );
    }

    #[test]
    fn state_serializes_screaming_snake_case() {
        let raw = serde_json::to_string(&State::ReduceInProgress).unwrap();
        assert_eq!(raw, "\"REDUCE_IN_PROGRESS\"");
        assert_eq!(State::FinalizerInProgress.to_string(), "FINALIZER_IN_PROGRESS");
    }

    #[test]
    fn create_fills_defaults_and_registers() {
        let ctx = ctx();
        let process = Process::create(&ctx, ProcessSpec::default()).unwrap();
        assert_eq!(process.state(), State::NotStarted);
        assert!(!process.spec().ordered);
        assert!(!process.spec().synchronous);
        assert_eq!(process.spec().result_timeout, Some(Duration::from_secs(86_400)));
        assert_eq!(Process::ps(&ctx).unwrap(), vec![process.pid()]);
    }

    #[test]
    fn configured_result_timeout_reaches_the_cache() {
        let config = crate::config::Config::from_toml("result_timeout = \"2h\"").unwrap();
        let ctx = Arc::new(Context::in_memory().with_config(config));
        let process = Process::create_from_pipeline(&ctx, "word_count", vec![]).unwrap();
        assert_eq!(process.spec().result_timeout, Some(Duration::from_secs(7200)));

        process.save_result(&serde_json::json!({"a": 1})).unwrap();
        let location = ctx.keys.result_cache(&process.result_key(&[]));
        let ttl = ctx.store.ttl(&location).unwrap().unwrap();
        assert!(ttl > Duration::from_secs(3600) && ttl <= Duration::from_secs(7200));
    }

    #[test]
    fn explicit_result_timeout_wins_over_config() {
        let config = crate::config::Config::from_toml("result_timeout = \"2h\"").unwrap();
        let ctx = Arc::new(Context::in_memory().with_config(config));
        let spec = ProcessSpec {
            result_timeout: Some(Duration::from_secs(60)),
            ..ProcessSpec::default()
        };
        let process = Process::create(&ctx, spec).unwrap();
        assert_eq!(process.result_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn pids_are_unique() {
        let ctx = ctx();
        let a = Process::create(&ctx, ProcessSpec::default()).unwrap();
        let b = Process::create(&ctx, ProcessSpec::default()).unwrap();
        assert_ne!(a.pid(), b.pid());
    }

    #[test]
    fn unknown_implementation_is_a_configuration_error() {
        let ctx = ctx();
        let spec = ProcessSpec {
            mapper: "no_such_mapper".into(),
            ..ProcessSpec::default()
        };
        let err = Process::create(&ctx, spec).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(Process::ps(&ctx).unwrap().is_empty());
    }

    #[test]
    fn reopening_yields_the_saved_spec() {
        let ctx = ctx();
        let spec = ProcessSpec {
            ordered: true,
            key_args: vec!["a".into(), "b".into()],
            result_timeout: Some(Duration::from_secs(90)),
            process_type: "report".into(),
            ..ProcessSpec::default()
        };
        let mut process = Process::create(&ctx, spec).unwrap();
        process.update(|spec| spec.key_args.push("c".into())).unwrap();

        let reopened = Process::open(&ctx, process.pid()).unwrap().unwrap();
        assert_eq!(reopened.spec(), process.spec());
        let stored = ctx.store.get(&ctx.keys.pid(process.pid())).unwrap().unwrap();
        assert_eq!(serde_json::to_string(reopened.spec()).unwrap(), stored);
    }

    #[test]
    fn open_missing_process_is_none() {
        let ctx = ctx();
        assert!(Process::open(&ctx, 42).unwrap().is_none());
    }

    #[test]
    fn unordered_map_keys_are_the_distinct_emitted_keys() {
        let ctx = ctx();
        let process = Process::create(&ctx, ProcessSpec::default()).unwrap();
        for (k, v) in [("b", "1"), ("a", "1"), ("b", "2"), ("c", "1")] {
            process.emit_intermediate(k, v).unwrap();
        }
        let mut keys = process.map_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(process.num_keys().unwrap(), 3);
        assert_eq!(process.map_values("b").unwrap(), vec!["1", "2"]);
        assert_eq!(process.num_values("b").unwrap(), 2);
    }

    #[test]
    fn ordered_map_keys_follow_rank() {
        let ctx = ctx();
        let spec = ProcessSpec {
            ordered: true,
            ..ProcessSpec::default()
        };
        let process = Process::create(&ctx, spec).unwrap();
        process.emit_intermediate_ranked(3.0, "third", "x").unwrap();
        process.emit_intermediate_ranked(1.0, "first", "x").unwrap();
        process.emit_intermediate_ranked(2.0, "second", "x").unwrap();
        assert_eq!(process.map_keys().unwrap(), vec!["first", "second", "third"]);
        assert!(process.emit_intermediate("unranked", "x").is_err());
    }

    #[test]
    fn same_key_twice_shares_one_slot() {
        let ctx = ctx();
        let process = Process::create(&ctx, ProcessSpec::default()).unwrap();
        process.emit_intermediate("fox", "1").unwrap();
        process.emit_intermediate("fox", "1").unwrap();
        assert_eq!(process.map_values("fox").unwrap(), vec!["1", "1"]);
        assert_eq!(process.map_keys().unwrap(), vec!["fox"]);
    }

    #[test]
    fn colliding_keys_are_fatal() {
        fn constant(_: &str) -> String {
            "0".to_string()
        }
        let ctx = Arc::new(Context::in_memory().with_hasher(constant));
        let process = Process::create(&ctx, ProcessSpec::default()).unwrap();
        process.emit_intermediate("a", "1").unwrap();
        let err = process.emit_intermediate("b", "1").unwrap_err();
        assert!(err.is_fatal());
        match err {
            Error::KeyCollision { key, existing, .. } => {
                assert_eq!(key, "b");
                assert_eq!(existing, "a");
            }
            other => panic!("unexpected error: {}", other),
        }
        // nothing was written for the colliding key
        assert_eq!(process.map_keys().unwrap(), vec!["a"]);
        assert_eq!(process.map_values("a").unwrap(), vec!["1"]);
    }

    #[test]
    fn emit_appends_reduced_values() {
        let ctx = ctx();
        let process = Process::create(&ctx, ProcessSpec::default()).unwrap();
        process.emit_intermediate("k", "1").unwrap();
        process.emit("k", "7").unwrap();
        assert_eq!(process.reduce_values("k").unwrap(), vec!["7"]);
        let mut seen = Vec::new();
        process
            .each_key_reduced_value(|key, values| {
                seen.push((key.to_string(), values));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![("k".to_string(), vec!["7".to_string()])]);
    }

    #[test]
    fn safe_delete_refuses_while_working() {
        let ctx = ctx();
        let process = Process::create(&ctx, ProcessSpec::default()).unwrap();
        process.emit_intermediate("k", "1").unwrap();
        master::assign_slave(&ctx, process.pid()).unwrap();
        assert!(!process.delete(true).unwrap());
        assert!(Process::open(&ctx, process.pid()).unwrap().is_some());

        master::free_slave(&ctx, process.pid()).unwrap();
        assert!(process.delete(true).unwrap());
        assert!(Process::open(&ctx, process.pid()).unwrap().is_none());
        assert!(Process::info(&ctx, process.pid()).unwrap().is_empty());
        assert!(Process::ps(&ctx).unwrap().is_empty());
        // counter is reset once no process remains
        assert!(!ctx.store.exists(&ctx.keys.processes_count()).unwrap());
    }

    #[test]
    fn delete_leaves_other_processes_alone() {
        let ctx = ctx();
        let processes: Vec<Process> = (0..10)
            .map(|_| Process::create(&ctx, ProcessSpec::default()).unwrap())
            .collect();
        let first = &processes[0];
        let tenth = &processes[9];
        assert_eq!((first.pid(), tenth.pid()), (1, 10));
        tenth.emit_intermediate("k", "1").unwrap();
        first.delete(true).unwrap();
        assert_eq!(tenth.map_values("k").unwrap(), vec!["1"]);
        assert!(Process::open(&ctx, 10).unwrap().is_some());
    }

    #[test]
    fn result_key_uses_type_and_key_args() {
        let ctx = ctx();
        let spec = ProcessSpec {
            key_args: vec!["2024".into()],
            process_type: "report".into(),
            ..ProcessSpec::default()
        };
        let process = Process::create(&ctx, spec).unwrap();
        assert_eq!(process.result_key(&[]), "report:2024");
        assert_eq!(process.result_key(&["eu"]), "report:2024:eu");
    }

    #[test]
    fn saved_result_round_trips_through_the_outputter() {
        let ctx = ctx();
        let process = Process::create(&ctx, ProcessSpec::default()).unwrap();
        assert_eq!(process.get_saved_result().unwrap(), None);
        let value = serde_json::json!({"fox": 1});
        process.save_result(&value).unwrap();
        assert_eq!(process.get_saved_result().unwrap(), Some(value));
        let location = ctx.keys.result_cache(&process.result_key(&[]));
        assert!(ctx.store.ttl(&location).unwrap().is_some());
        assert!(process.delete_saved_result().unwrap());
        assert_eq!(process.get_saved_result().unwrap(), None);
    }

    #[test]
    fn data_reference_needs_an_inputter() {
        let ctx = ctx();
        let spec = ProcessSpec {
            inputter: None,
            ..ProcessSpec::default()
        };
        let mut process = Process::create(&ctx, spec).unwrap();
        let err = process
            .run(Input::Reference("doc".into()), true)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
