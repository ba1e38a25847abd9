//! Built-in reducers.

use crate::error::{Error, Result};
use crate::process::Process;
use crate::worker::{ReduceSink, Reducer};

/// Sums integer values.
pub struct Adder;

impl Reducer for Adder {
    fn reduce(&self, values: Vec<String>, sink: &mut dyn ReduceSink) -> Result<()> {
        let mut sum: i64 = 0;
        for value in &values {
            sum = sum
                .checked_add(value.trim().parse::<i64>()?)
                .ok_or_else(|| Error::worker("sum overflows i64"))?;
        }
        sink.emit(&sum.to_string())
    }
}

/// Passes map values through unchanged.
pub struct Identity;

impl Reducer for Identity {
    fn reduce(&self, values: Vec<String>, sink: &mut dyn ReduceSink) -> Result<()> {
        for value in &values {
            sink.emit(value)?;
        }
        Ok(())
    }

    fn reduce_perform(&self, process: &Process, key: &str) -> Result<()> {
        for value in process.map_values(key)? {
            process.emit(key, &value)?;
        }
        Ok(())
    }
}

/// Emits the number of values.
pub struct Counter;

impl Reducer for Counter {
    fn reduce(&self, values: Vec<String>, sink: &mut dyn ReduceSink) -> Result<()> {
        sink.emit(&values.len().to_string())
    }

    fn reduce_perform(&self, process: &Process, key: &str) -> Result<()> {
        let count = process.num_values(key)?;
        process.emit(key, &count.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(reducer: &dyn Reducer, values: &[&str]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        reducer.reduce(values.iter().map(|v| v.to_string()).collect(), &mut out)?;
        Ok(out)
    }

    #[test]
    fn adder_sums_integers() {
        assert_eq!(run(&Adder, &["1", "2", " 39"]).unwrap(), vec!["42"]);
        assert_eq!(run(&Adder, &[]).unwrap(), vec!["0"]);
        assert!(run(&Adder, &["one"]).is_err());
    }

    #[test]
    fn adder_overflow_is_an_error() {
        let max = i64::MAX.to_string();
        let err = run(&Adder, &[max.as_str(), "1"]).unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
        assert_eq!(run(&Adder, &[max.as_str(), "-1", "1"]).unwrap(), vec![max]);
    }

    #[test]
    fn identity_and_counter() {
        assert_eq!(run(&Identity, &["x", "y"]).unwrap(), vec!["x", "y"]);
        assert_eq!(run(&Counter, &["x", "y", "z"]).unwrap(), vec!["3"]);
    }
}
