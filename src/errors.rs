// src/errors.rs

//! Crate-wide error types.
//!
//! Each layer has its own enum so callers can match on the failures they can
//! act on; [`RundagError`] folds them together for callers that just want `?`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Structural problems with a set of task descriptors.
///
/// These abort a run before any task executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate task id: {0}")]
    DuplicateId(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("cycle detected in task graph; unresolved tasks: {}", .remaining.join(", "))]
    Cycle { remaining: Vec<String> },

    #[error("invalid task descriptor '{id}': {reason}")]
    InvalidDescriptor { id: String, reason: String },
}

/// Why a single attempt of a task failed.
///
/// Both variants are retryable up to the task's retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task '{id}' timed out after {timeout:?}")]
    Timeout { id: String, timeout: Duration },

    #[error("task '{id}' failed: {message}")]
    Execution { id: String, message: String },
}

/// Failures of the durable context store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("could not acquire lock on {path:?} after {attempts} attempts")]
    LockAcquisition { path: PathBuf, attempts: u32 },

    #[error("context store has no storage directory (in-memory store)")]
    NoStorage,

    #[error("invalid store identifier '{0}': must be a non-empty file name")]
    InvalidId(String),

    /// Recovered internally by `load`; only surfaced by lower-level helpers.
    #[error("corrupt snapshot at {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures while loading or validating a config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum RundagError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RundagError>;
