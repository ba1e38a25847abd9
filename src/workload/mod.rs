//! Converts implementation and pipeline names to actual code.
//!
//! A process specification names its inputter, mapper, reducer, finalizer
//! and outputter; workers resolve those names here.
//!
//! # Example
//!
//! ```
//! # use kvmr::Result;
//! use kvmr::workload::Registry;
//! # fn main() -> Result<()> {
//! let registry = Registry::builtin();
//! let word_count = registry.pipeline("word_count")?;
//! assert_eq!(word_count.spec.mapper, "word_counter");
//! # Ok(())
//! # }
//! ```

use fnv::FnvHashMap;
use itertools::Itertools;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::process::ProcessSpec;
use crate::worker::{Finalizer, Inputter, Mapper, Outputter, Reducer};

pub mod chars;
pub mod finalizers;
pub mod outputters;
pub mod reducers;
pub mod wc;

/// Derives a result cache location from a process type and its key args.
pub type ResultKeyFn = fn(process_type: &str, key_args: &[String]) -> String;

/// `type:arg1:arg2...`, or just the type without args.
pub fn default_result_key(process_type: &str, key_args: &[String]) -> String {
    std::iter::once(process_type).chain(key_args.iter().map(String::as_str)).join(":")
}

/// A named, reusable process template.
#[derive(Clone)]
pub struct Pipeline {
    pub spec: ProcessSpec,
    pub result_key: ResultKeyFn,
}

#[derive(Clone, Default)]
pub struct Registry {
    inputters: FnvHashMap<String, Arc<dyn Inputter>>,
    mappers: FnvHashMap<String, Arc<dyn Mapper>>,
    reducers: FnvHashMap<String, Arc<dyn Reducer>>,
    finalizers: FnvHashMap<String, Arc<dyn Finalizer>>,
    outputters: FnvHashMap<String, Arc<dyn Outputter>>,
    pipelines: FnvHashMap<String, Pipeline>,
}

fn unknown(kind: &str, name: &str) -> Error {
    Error::configuration(format!("no {} named `{}` found", kind, name))
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in implementation and pipeline.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register_inputter("word_stream", wc::WordStream)
            .register_inputter("char_stream", chars::CharStream)
            .register_mapper("word_counter", wc::WordCounter)
            .register_mapper("char_counter", chars::CharCounter)
            .register_reducer("adder", reducers::Adder)
            .register_reducer("identity", reducers::Identity)
            .register_reducer("counter", reducers::Counter)
            .register_finalizer("to_hash", finalizers::ToHash)
            .register_finalizer("notify", finalizers::Notify)
            .register_outputter("raw", outputters::Raw)
            .register_outputter("json", outputters::Json);

        registry.register_pipeline(
            "word_count",
            Pipeline {
                spec: ProcessSpec {
                    process_type: "word_count".to_string(),
                    ..ProcessSpec::default()
                },
                result_key: default_result_key,
            },
        );
        registry.register_pipeline(
            "char_count",
            Pipeline {
                spec: ProcessSpec {
                    inputter: Some("char_stream".to_string()),
                    mapper: "char_counter".to_string(),
                    process_type: "char_count".to_string(),
                    ..ProcessSpec::default()
                },
                result_key: default_result_key,
            },
        );
        registry
    }

    pub fn register_inputter(&mut self, name: &str, imp: impl Inputter + 'static) -> &mut Self {
        self.inputters.insert(name.to_string(), Arc::new(imp));
        self
    }

    pub fn register_mapper(&mut self, name: &str, imp: impl Mapper + 'static) -> &mut Self {
        self.mappers.insert(name.to_string(), Arc::new(imp));
        self
    }

    pub fn register_reducer(&mut self, name: &str, imp: impl Reducer + 'static) -> &mut Self {
        self.reducers.insert(name.to_string(), Arc::new(imp));
        self
    }

    pub fn register_finalizer(&mut self, name: &str, imp: impl Finalizer + 'static) -> &mut Self {
        self.finalizers.insert(name.to_string(), Arc::new(imp));
        self
    }

    pub fn register_outputter(&mut self, name: &str, imp: impl Outputter + 'static) -> &mut Self {
        self.outputters.insert(name.to_string(), Arc::new(imp));
        self
    }

    pub fn register_pipeline(&mut self, name: &str, pipeline: Pipeline) -> &mut Self {
        self.pipelines.insert(name.to_string(), pipeline);
        self
    }

    pub fn try_inputter(&self, name: &str) -> Option<Arc<dyn Inputter>> {
        self.inputters.get(name).cloned()
    }

    pub fn try_mapper(&self, name: &str) -> Option<Arc<dyn Mapper>> {
        self.mappers.get(name).cloned()
    }

    pub fn try_reducer(&self, name: &str) -> Option<Arc<dyn Reducer>> {
        self.reducers.get(name).cloned()
    }

    pub fn try_finalizer(&self, name: &str) -> Option<Arc<dyn Finalizer>> {
        self.finalizers.get(name).cloned()
    }

    pub fn try_outputter(&self, name: &str) -> Option<Arc<dyn Outputter>> {
        self.outputters.get(name).cloned()
    }

    pub fn try_pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    pub fn inputter(&self, name: &str) -> Result<Arc<dyn Inputter>> {
        self.try_inputter(name).ok_or_else(|| unknown("inputter", name))
    }

    pub fn mapper(&self, name: &str) -> Result<Arc<dyn Mapper>> {
        self.try_mapper(name).ok_or_else(|| unknown("mapper", name))
    }

    pub fn reducer(&self, name: &str) -> Result<Arc<dyn Reducer>> {
        self.try_reducer(name).ok_or_else(|| unknown("reducer", name))
    }

    pub fn finalizer(&self, name: &str) -> Result<Arc<dyn Finalizer>> {
        self.try_finalizer(name).ok_or_else(|| unknown("finalizer", name))
    }

    pub fn outputter(&self, name: &str) -> Result<Arc<dyn Outputter>> {
        self.try_outputter(name).ok_or_else(|| unknown("outputter", name))
    }

    pub fn pipeline(&self, name: &str) -> Result<&Pipeline> {
        self.try_pipeline(name).ok_or_else(|| unknown("pipeline", name))
    }

    /// Names of the registered pipelines, sorted.
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).sorted().collect()
    }

    /// Check that every implementation `spec` names is registered.
    pub fn validate(&self, spec: &ProcessSpec) -> Result<()> {
        if let Some(inputter) = &spec.inputter {
            self.inputter(inputter)?;
        }
        self.mapper(&spec.mapper)?;
        self.reducer(&spec.reducer)?;
        self.finalizer(&spec.finalizer)?;
        self.outputter(&spec.outputter)?;
        Ok(())
    }

    /// `default` plus every lane a registered implementation asks for.
    pub fn lanes(&self, default: &str) -> Vec<String> {
        let named = self
            .inputters
            .values()
            .filter_map(|i| i.queue())
            .chain(self.mappers.values().filter_map(|m| m.queue()))
            .chain(self.reducers.values().filter_map(|r| r.queue()))
            .chain(self.finalizers.values().filter_map(|f| f.queue()));
        std::iter::once(default)
            .chain(named)
            .unique()
            .map(str::to_string)
            .collect()
    }
}
