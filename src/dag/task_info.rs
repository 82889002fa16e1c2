// src/dag/task_info.rs

//! Per-task mutable state for one run, and the unit handed to workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::dag::descriptor::{TaskDescriptor, TaskId, Work};
use crate::dag::retry::RetryPolicy;
use crate::errors::TaskError;

/// Lifecycle of a task within a run.
///
/// `Pending -> Running -> (Completed | Failed)`; a failed attempt with
/// attempts left goes back to `Pending`. `Skipped` is only reachable from
/// `Pending`.
///
/// One exception: when a fail-fast halt lands while a task is back in
/// `Pending` between attempts (waiting out its backoff, or queued for a retry
/// that a worker then discards), it moves `Pending -> Failed` directly,
/// keeping the error of its last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// Why a task never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// A direct or transitive dependency did not complete.
    UpstreamFailed { upstream: TaskId },
    /// The run halted under fail-fast before this task was started.
    Halted,
}

/// Per-run bookkeeping for one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub deps: Vec<TaskId>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub status: TaskStatus,
    /// Attempts started so far.
    pub attempts: u32,
    /// Set while the task sits in the ready queue, cleared when a worker
    /// reports that it started.
    pub queued: bool,
    /// Set while the task waits out a retry backoff.
    pub awaiting_retry: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error: Option<TaskError>,
    pub output: Option<Value>,
    pub skip_reason: Option<SkipReason>,
}

impl TaskRecord {
    pub fn from_descriptor(desc: &TaskDescriptor) -> Self {
        Self {
            id: desc.id.clone(),
            name: desc.name.clone(),
            deps: desc.depends_on.clone(),
            retry: desc.retry,
            timeout: desc.timeout,
            status: TaskStatus::Pending,
            attempts: 0,
            queued: false,
            awaiting_retry: false,
            started_at: None,
            ended_at: None,
            last_error: None,
            output: None,
            skip_reason: None,
        }
    }

    /// Wall-clock time between the first start and the terminal transition.
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// A single attempt the scheduler wants a worker to run now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    /// 1-based attempt number this dispatch represents.
    pub attempt: u32,
    pub timeout: Duration,
    pub work: Arc<dyn Work>,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
