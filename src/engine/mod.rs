// src/engine/mod.rs

//! Execution engine for rundag.
//!
//! This module ties together:
//! - the synchronous DAG scheduler
//! - a bounded pool of workers draining the ready queue
//! - the runtime event loop that reacts to:
//!   - attempt start / finish reports from workers
//!   - retry timers firing
//!   - discarded tasks after a fail-fast halt
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`] and [`worker`].

use chrono::{DateTime, Utc};

use crate::dag::{AttemptOutcome, TaskId};

/// Scheduler knobs for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Number of workers, i.e. the maximum number of simultaneously running
    /// tasks.
    pub max_parallelism: usize,
    /// Stop admitting new tasks after the first task failure.
    pub fail_fast: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_parallelism: 4,
            fail_fast: false,
        }
    }
}

impl SchedulerOptions {
    pub fn new(max_parallelism: usize, fail_fast: bool) -> Self {
        Self {
            max_parallelism,
            fail_fast,
        }
    }
}

/// Events flowing into the runtime from workers and retry timers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A worker pulled a task from the ready queue and began an attempt.
    TaskStarted {
        task: TaskId,
        attempt: u32,
        at: DateTime<Utc>,
    },
    /// An attempt finished, successfully or not.
    AttemptFinished {
        task: TaskId,
        attempt: u32,
        at: DateTime<Utc>,
        outcome: AttemptOutcome,
    },
    /// A worker pulled a task after the run halted and did not start it.
    TaskDiscarded { task: TaskId, at: DateTime<Utc> },
    /// A retry backoff elapsed.
    RetryDue { task: TaskId },
}

pub mod core;
pub mod runtime;
pub mod worker;

pub use self::core::{CoreCommand, CoreRuntime, CoreStep, RunRecord};
pub use runtime::Runtime;
pub use worker::WorkerPool;
