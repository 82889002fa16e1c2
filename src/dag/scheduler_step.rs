// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::time::Duration;

use crate::dag::descriptor::TaskId;
use crate::dag::task_info::ScheduledTask;

/// A failed attempt that should be retried after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub id: TaskId,
    /// 1-based number of the attempt that just failed.
    pub failed_attempt: u32,
    /// Un-jittered backoff; the runtime adds jitter.
    pub delay: Duration,
}

/// Structured result of a single scheduler "step".
///
/// The async runtime turns this into work: dispatching tasks, arming retry
/// timers, recording events. Tests can step the scheduler by hand and assert
/// on it directly.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that entered the ready queue in this step.
    pub newly_ready: Vec<ScheduledTask>,
    /// Tasks that completed in this step.
    pub newly_completed: Vec<TaskId>,
    /// Tasks that reached `Failed` in this step.
    pub newly_failed: Vec<TaskId>,
    /// Tasks that were skipped in this step.
    pub newly_skipped: Vec<TaskId>,
    /// Retry to arm, if the finished attempt failed with attempts left.
    pub retry: Option<RetryRequest>,
    /// Whether this step triggered the fail-fast halt.
    pub halted: bool,
    /// Whether every task is now terminal.
    pub run_finished: bool,
}
