// src/dag/mod.rs

//! Task graph construction and scheduling.
//!
//! - [`descriptor`] defines the caller-facing task record and the `Work` trait.
//! - [`graph`] validates descriptors and holds the immutable dependency graph.
//! - [`retry`] holds the retry policy and backoff arithmetic.
//! - [`task_info`] provides per-run task state and scheduled task types.
//! - [`state_manager`] manages per-run state transitions.
//! - [`scheduler`] is the synchronous per-run state machine.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`summary`] is the final report of a run.

pub mod descriptor;
pub mod graph;
pub mod retry;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod summary;
pub mod task_info;

pub use descriptor::{TaskContext, TaskDescriptor, TaskId, Work, WorkFuture};
pub use graph::TaskGraph;
pub use retry::RetryPolicy;
pub use scheduler::{AttemptOutcome, Scheduler};
pub use scheduler_step::{RetryRequest, SchedulerStep};
pub use summary::{ExecutionSummary, TaskSummary};
pub use task_info::{ScheduledTask, SkipReason, TaskRecord, TaskStatus};
