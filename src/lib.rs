//! A MapReduce engine coordinated through a shared key-value store.
//!
//! Users name a mapper, a reducer and a finalizer for a process, then run
//! it over partitioned input. Units of work travel through a queue and are
//! executed by independent workers; the only state they share is a
//! key-value store. There is no central coordinator: the worker that frees
//! the last outstanding unit of a phase schedules the next one.

pub mod cache;
pub mod cmd;
pub mod config;
pub mod context;
pub mod error;
pub mod keys;
pub mod master;
pub mod process;
pub mod queue;
pub mod standalone;
pub mod store;
pub mod worker;
pub mod workload;

pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use process::{Input, Pid, Process, ProcessSpec, State};
pub use worker::WorkUnit;

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single intermediate key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
