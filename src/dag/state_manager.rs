// src/dag/state_manager.rs

//! Per-run state transitions over the task records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::TaskGraph;
use crate::dag::descriptor::TaskId;
use crate::dag::task_info::{ScheduledTask, SkipReason, TaskRecord, TaskStatus};

/// Mutating view over the records of one run.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    records: &'a mut HashMap<TaskId, TaskRecord>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph, records: &'a mut HashMap<TaskId, TaskRecord>) -> Self {
        Self { graph, records }
    }

    /// Whether every dependency of `id` has completed.
    pub fn deps_completed(&self, id: &str) -> bool {
        ReadOnlyStateManager::new(self.records).deps_completed(id)
    }

    /// Queue every task that is pending, not yet queued, and whose
    /// dependencies have all completed. Used once at the start of a run.
    pub fn collect_initial_ready(&mut self) -> Vec<ScheduledTask> {
        let candidates: Vec<TaskId> = self
            .graph
            .ids()
            .filter(|id| self.is_admissible(id))
            .map(str::to_string)
            .collect();

        candidates
            .into_iter()
            .filter_map(|id| self.enqueue(&id))
            .collect()
    }

    /// Queue the dependents of `completed` that just became ready.
    pub fn collect_ready_dependents(&mut self, completed: &str) -> Vec<ScheduledTask> {
        let candidates: Vec<TaskId> = self
            .graph
            .dependents_of(completed)
            .into_iter()
            .filter(|id| self.is_admissible(id))
            .map(str::to_string)
            .collect();

        candidates
            .into_iter()
            .filter_map(|id| self.enqueue(&id))
            .collect()
    }

    /// Re-queue a task whose retry backoff has elapsed.
    pub fn requeue_for_retry(&mut self, id: &str) -> Option<ScheduledTask> {
        let record = self.records.get_mut(id)?;
        if record.status != TaskStatus::Pending || !record.awaiting_retry {
            debug!(task = %id, status = ?record.status, "retry due for task not awaiting retry; ignoring");
            return None;
        }
        record.awaiting_retry = false;
        self.enqueue(id)
    }

    /// Mark every transitive dependent of `failed` as skipped.
    ///
    /// Only pending, unqueued tasks can be skipped here; a dependent cannot be
    /// queued or running while one of its ancestors has not completed.
    pub fn mark_dependents_skipped(&mut self, failed: &str, at: DateTime<Utc>) -> Vec<TaskId> {
        let dependents: Vec<TaskId> = self
            .graph
            .transitive_dependents(failed)
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut newly_skipped = Vec::new();
        for id in dependents {
            let Some(record) = self.records.get_mut(&id) else {
                warn!(task = %id, "node in graph not present in records");
                continue;
            };
            if record.status == TaskStatus::Pending && !record.queued {
                record.status = TaskStatus::Skipped;
                record.ended_at = Some(at);
                record.skip_reason = Some(SkipReason::UpstreamFailed {
                    upstream: failed.to_string(),
                });
                debug!(task = %id, upstream = %failed, "skipping task due to failed dependency");
                newly_skipped.push(id);
            }
        }
        newly_skipped
    }

    /// Stop admitting work after a fail-fast trigger.
    ///
    /// Unqueued pending tasks are skipped; tasks waiting out a retry backoff
    /// fail with their last error. Queued tasks are left for the workers to
    /// discard (or to start, if they raced the halt).
    pub fn halt(&mut self, at: DateTime<Utc>) -> (Vec<TaskId>, Vec<TaskId>) {
        let mut skipped = Vec::new();
        let mut failed = Vec::new();

        for id in self.graph.ids() {
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            if record.status != TaskStatus::Pending || record.queued {
                continue;
            }
            if record.awaiting_retry {
                record.awaiting_retry = false;
                record.status = TaskStatus::Failed;
                record.ended_at = Some(at);
                failed.push(record.id.clone());
            } else {
                record.status = TaskStatus::Skipped;
                record.ended_at = Some(at);
                record.skip_reason = Some(SkipReason::Halted);
                skipped.push(record.id.clone());
            }
        }

        (skipped, failed)
    }

    fn is_admissible(&self, id: &str) -> bool {
        match self.records.get(id) {
            Some(r) => {
                r.status == TaskStatus::Pending
                    && !r.queued
                    && !r.awaiting_retry
                    && self.deps_completed(id)
            }
            None => false,
        }
    }

    fn enqueue(&mut self, id: &str) -> Option<ScheduledTask> {
        let desc = self.graph.get(id)?;
        let record = self.records.get_mut(id)?;
        record.queued = true;
        let attempt = record.attempts + 1;

        if attempt == 1 {
            info!(task = %id, "dependencies satisfied; queueing task");
        } else {
            info!(task = %id, attempt, "queueing task for retry");
        }

        Some(ScheduledTask {
            id: record.id.clone(),
            attempt,
            timeout: record.timeout,
            work: desc.work.clone(),
        })
    }
}

/// Read-only view for dependency checks when only shared access is available.
pub struct ReadOnlyStateManager<'a> {
    records: &'a HashMap<TaskId, TaskRecord>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(records: &'a HashMap<TaskId, TaskRecord>) -> Self {
        Self { records }
    }

    pub fn deps_completed(&self, id: &str) -> bool {
        let Some(record) = self.records.get(id) else {
            return false;
        };
        record.deps.iter().all(|dep| {
            self.records
                .get(dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        })
    }

    /// Ids of tasks currently in the given status.
    pub fn ids_in(&self, status: TaskStatus) -> HashSet<&str> {
        self.records
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.id.as_str())
            .collect()
    }
}
