// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - pushing `ScheduledTask`s into the ready queue
//! - arming retry timers
//! - signalling cancellation on halt
//! - recording outcomes in the context store
//!
//! The core can be unit tested without any Tokio, channels, or filesystem.

use serde_json::Value;

use crate::dag::{
    ExecutionSummary, RetryRequest, ScheduledTask, Scheduler, SchedulerStep, SkipReason, TaskId,
};
use crate::engine::RuntimeEvent;

/// Outcome records the shell may persist (e.g. into the context store).
#[derive(Debug, Clone, PartialEq)]
pub enum RunRecord {
    Completed {
        task: TaskId,
        attempts: u32,
        output: Value,
    },
    Failed {
        task: TaskId,
        attempts: u32,
        error: String,
    },
    Skipped {
        task: TaskId,
        reason: Option<SkipReason>,
    },
}

/// Instructions for the IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Push these tasks into the ready queue.
    Dispatch(Vec<ScheduledTask>),
    /// Arm a retry timer.
    ArmRetry(RetryRequest),
    /// Fail-fast triggered: signal cooperative cancellation.
    Halt,
    /// Persist a task outcome.
    Record(RunRecord),
}

/// Result of feeding one event to the core.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

/// Pure core runtime state.
///
/// Owns the scheduler. It has **no** channels, no Tokio types, and does not
/// perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn summary(&self) -> ExecutionSummary {
        self.scheduler.summary()
    }

    /// Kick off the run.
    pub fn start(&mut self) -> CoreStep {
        let step = self.scheduler.start();
        self.commands_for(step)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskStarted { task, attempt, at } => {
                self.scheduler.step_started(&task, attempt, at);
                CoreStep {
                    commands: Vec::new(),
                    keep_running: !self.scheduler.is_finished(),
                }
            }
            RuntimeEvent::AttemptFinished {
                task,
                attempt,
                at,
                outcome,
            } => {
                let step = self.scheduler.step_completion(&task, attempt, at, outcome);
                self.commands_for(step)
            }
            RuntimeEvent::TaskDiscarded { task, at } => {
                let step = self.scheduler.step_discarded(&task, at);
                self.commands_for(step)
            }
            RuntimeEvent::RetryDue { task } => {
                let step = self.scheduler.step_retry_due(&task);
                self.commands_for(step)
            }
        }
    }

    fn commands_for(&self, step: SchedulerStep) -> CoreStep {
        let mut commands = Vec::new();

        if step.halted {
            commands.push(CoreCommand::Halt);
        }
        if !step.newly_ready.is_empty() {
            commands.push(CoreCommand::Dispatch(step.newly_ready));
        }
        if let Some(retry) = step.retry {
            commands.push(CoreCommand::ArmRetry(retry));
        }

        for id in step.newly_completed {
            if let Some(r) = self.scheduler.record(&id) {
                commands.push(CoreCommand::Record(RunRecord::Completed {
                    task: id.clone(),
                    attempts: r.attempts,
                    output: r.output.clone().unwrap_or(Value::Null),
                }));
            }
        }
        for id in step.newly_failed {
            if let Some(r) = self.scheduler.record(&id) {
                commands.push(CoreCommand::Record(RunRecord::Failed {
                    task: id.clone(),
                    attempts: r.attempts,
                    error: r
                        .last_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                }));
            }
        }
        for id in step.newly_skipped {
            let reason = self
                .scheduler
                .record(&id)
                .and_then(|r| r.skip_reason.clone());
            commands.push(CoreCommand::Record(RunRecord::Skipped { task: id, reason }));
        }

        CoreStep {
            commands,
            keep_running: !step.run_finished,
        }
    }
}
