// src/dag/scheduler.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::dag::descriptor::TaskId;
use crate::dag::scheduler_step::{RetryRequest, SchedulerStep};
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::summary::{ExecutionSummary, TaskSummary};
use crate::dag::task_info::{SkipReason, TaskRecord, TaskStatus};
use crate::dag::TaskGraph;
use crate::errors::TaskError;

/// Outcome of one attempt, as reported by a worker.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success(Value),
    Failed(TaskError),
}

/// Scheduler holds the immutable graph plus mutable per-run state.
///
/// It is a synchronous state machine: it never spawns, sleeps or reads the
/// clock. The async runtime feeds it worker reports and acts on the
/// [`SchedulerStep`]s it returns. It is responsible for:
/// - deciding when a task is ready (all dependencies completed)
/// - tracking attempts and deciding between retry and failure
/// - skipping transitive dependents of failed tasks
/// - halting admission under fail-fast
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    records: HashMap<TaskId, TaskRecord>,
    fail_fast: bool,
    halted: bool,
    started: bool,
}

impl Scheduler {
    pub fn new(graph: TaskGraph, fail_fast: bool) -> Self {
        let records = graph
            .descriptors()
            .iter()
            .map(|d| (d.id.clone(), TaskRecord::from_descriptor(d)))
            .collect();

        Self {
            graph,
            records,
            fail_fast,
            halted: false,
            started: false,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.records.get(id).map(|r| r.status)
    }

    pub fn record(&self, id: &str) -> Option<&TaskRecord> {
        self.records.get(id)
    }

    /// Number of tasks currently `Running`.
    pub fn running_count(&self) -> usize {
        ReadOnlyStateManager::new(&self.records)
            .ids_in(TaskStatus::Running)
            .len()
    }

    /// Whether every dependency of `id` has completed. `None` for unknown ids.
    pub fn deps_completed(&self, id: &str) -> Option<bool> {
        self.records.get(id)?;
        Some(ReadOnlyStateManager::new(&self.records).deps_completed(id))
    }

    /// Whether every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.records.values().all(|r| r.status.is_terminal())
    }

    /// Begin the run: queue every task with no unmet dependencies.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler: start called twice; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;

        let mut manager = StateManager::new(&self.graph, &mut self.records);
        let newly_ready = manager.collect_initial_ready();
        info!(
            tasks = self.graph.len(),
            ready = newly_ready.len(),
            "scheduler: starting run"
        );

        SchedulerStep {
            newly_ready,
            run_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }

    /// A worker pulled `id` from the ready queue and started `attempt`.
    pub fn step_started(&mut self, id: &str, attempt: u32, at: DateTime<Utc>) {
        let Some(record) = self.records.get_mut(id) else {
            warn!(task = %id, "start reported for unknown task; ignoring");
            return;
        };
        if record.status != TaskStatus::Pending {
            warn!(task = %id, status = ?record.status, "start reported for non-pending task; ignoring");
            return;
        }

        record.status = TaskStatus::Running;
        record.queued = false;
        record.attempts = attempt;
        if record.started_at.is_none() {
            record.started_at = Some(at);
        }
        debug!(task = %id, attempt, "task running");
    }

    /// A worker pulled `id` but refused to start it because the run halted.
    pub fn step_discarded(&mut self, id: &str, at: DateTime<Utc>) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if let Some(record) = self.records.get_mut(id) {
            if record.status == TaskStatus::Pending && record.queued {
                record.queued = false;
                if record.attempts > 0 {
                    // Queued retry of a task that already ran.
                    record.status = TaskStatus::Failed;
                    record.ended_at = Some(at);
                    step.newly_failed.push(record.id.clone());
                } else {
                    record.status = TaskStatus::Skipped;
                    record.ended_at = Some(at);
                    record.skip_reason = Some(SkipReason::Halted);
                    step.newly_skipped.push(record.id.clone());
                }
                debug!(task = %id, "queued task discarded after halt");
            }
        }
        step.run_finished = self.is_finished();
        step
    }

    /// A worker finished an attempt of `id`.
    pub fn step_completion(
        &mut self,
        id: &str,
        attempt: u32,
        at: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(record) = self.records.get_mut(id) else {
            warn!(task = %id, "completion for unknown task; ignoring");
            return step;
        };
        if record.status != TaskStatus::Running || record.attempts != attempt {
            warn!(
                task = %id,
                attempt,
                status = ?record.status,
                "completion for task that is not running this attempt; ignoring"
            );
            return step;
        }

        match outcome {
            AttemptOutcome::Success(output) => {
                record.status = TaskStatus::Completed;
                record.ended_at = Some(at);
                record.last_error = None;
                record.output = Some(output);
                info!(task = %id, attempt, "task completed");
                step.newly_completed.push(id.to_string());

                if !self.halted {
                    let mut manager = StateManager::new(&self.graph, &mut self.records);
                    step.newly_ready = manager.collect_ready_dependents(id);
                }
            }
            AttemptOutcome::Failed(err) => {
                let retry_allowed = record.retry.allows_another(attempt) && !self.halted;
                if retry_allowed {
                    let delay = record.retry.delay_for(attempt);
                    warn!(
                        task = %id,
                        attempt,
                        max_attempts = record.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "task attempt failed; will retry"
                    );
                    record.status = TaskStatus::Pending;
                    record.awaiting_retry = true;
                    record.last_error = Some(err);
                    step.retry = Some(RetryRequest {
                        id: id.to_string(),
                        failed_attempt: attempt,
                        delay,
                    });
                } else {
                    error!(task = %id, attempts = attempt, error = %err, "task failed");
                    record.status = TaskStatus::Failed;
                    record.ended_at = Some(at);
                    record.last_error = Some(err);
                    step.newly_failed.push(id.to_string());

                    let mut manager = StateManager::new(&self.graph, &mut self.records);
                    step.newly_skipped = manager.mark_dependents_skipped(id, at);

                    if self.fail_fast && !self.halted {
                        self.halted = true;
                        step.halted = true;
                        warn!(task = %id, "fail-fast: halting admission of new tasks");
                        let mut manager = StateManager::new(&self.graph, &mut self.records);
                        let (skipped, failed) = manager.halt(at);
                        step.newly_skipped.extend(skipped);
                        step.newly_failed.extend(failed);
                    }
                }
            }
        }

        step.run_finished = self.is_finished();
        step
    }

    /// A retry backoff for `id` elapsed.
    pub fn step_retry_due(&mut self, id: &str) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.halted {
            debug!(task = %id, "retry due after halt; ignoring");
        } else {
            let mut manager = StateManager::new(&self.graph, &mut self.records);
            step.newly_ready.extend(manager.requeue_for_retry(id));
        }
        step.run_finished = self.is_finished();
        step
    }

    /// Build the summary from the current records, in descriptor order.
    pub fn summary(&self) -> ExecutionSummary {
        let tasks = self
            .graph
            .ids()
            .filter_map(|id| self.records.get(id))
            .map(TaskSummary::from)
            .collect();
        ExecutionSummary::from_tasks(tasks, self.halted)
    }
}
