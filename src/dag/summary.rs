// src/dag/summary.rs

//! Final report of one scheduler run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::dag::descriptor::TaskId;
use crate::dag::task_info::{SkipReason, TaskRecord, TaskStatus};

/// Per-task detail in an [`ExecutionSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl From<&TaskRecord> for TaskSummary {
    fn from(r: &TaskRecord) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            status: r.status,
            attempts: r.attempts,
            started_at: r.started_at,
            ended_at: r.ended_at,
            elapsed: r.elapsed(),
            error: r.last_error.as_ref().map(ToString::to_string),
            output: r.output.clone(),
            skip_reason: r.skip_reason.clone(),
        }
    }
}

/// Counts plus per-task detail, in descriptor order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Whether fail-fast halted admission during the run.
    pub halted: bool,
    pub tasks: Vec<TaskSummary>,
}

impl ExecutionSummary {
    pub fn from_tasks(tasks: Vec<TaskSummary>, halted: bool) -> Self {
        let count = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
        Self {
            total: tasks.len(),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            skipped: count(TaskStatus::Skipped),
            halted,
            tasks,
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Fraction of tasks that completed; 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_success(&self) -> bool {
        self.completed == self.total
    }
}
