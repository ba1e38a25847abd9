//! Error types for the MapReduce engine.

use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The process specification or an implementation is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Two different keys hashed to the same storage address within one process.
    ///
    /// Fatal for the affected process: its intermediate key space can no
    /// longer be trusted.
    #[error("key collision: key `{key}` => hashed key `{hashed_key}` already holds `{existing}`")]
    KeyCollision {
        key: String,
        hashed_key: String,
        existing: String,
    },

    /// Raised by reduce code to ask for a delayed retry of the same unit.
    #[error("operation failed but it is recoverable: {0}")]
    Recoverable(String),

    /// User map/reduce/finalize code failed.
    #[error("worker error: {0}")]
    Worker(String),

    /// The key-value store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(String),

    /// The work queue rejected or failed an operation.
    #[error("queue error: {0}")]
    Queue(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn configuration<E: fmt::Display>(msg: E) -> Self {
        Self::Configuration(msg.to_string())
    }

    pub fn recoverable<E: fmt::Display>(msg: E) -> Self {
        Self::Recoverable(msg.to_string())
    }

    pub fn worker<E: fmt::Display>(msg: E) -> Self {
        Self::Worker(msg.to_string())
    }

    pub fn store<E: fmt::Display>(msg: E) -> Self {
        Self::Store(msg.to_string())
    }

    pub fn queue<E: fmt::Display>(msg: E) -> Self {
        Self::Queue(msg.to_string())
    }

    /// Whether this error is the reduce retry signal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }

    /// Whether this error leaves the process corrupted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::KeyCollision { .. })
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::Worker(format!("expected an integer value: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_is_distinguished_from_other_failures() {
        assert!(Error::recoverable("redis busy").is_recoverable());
        assert!(!Error::worker("boom").is_recoverable());
        assert!(!Error::configuration("no mapper").is_recoverable());
    }

    #[test]
    fn key_collision_is_fatal_and_names_both_keys() {
        let err = Error::KeyCollision {
            key: "b".into(),
            hashed_key: "ff".into(),
            existing: "a".into(),
        };
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("`b`"));
        assert!(msg.contains("`a`"));
    }
}
