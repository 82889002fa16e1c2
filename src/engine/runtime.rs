// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::retry::with_jitter;
use crate::dag::{ExecutionSummary, RetryRequest, Scheduler, TaskGraph};
use crate::engine::core::{CoreCommand, CoreRuntime, RunRecord};
use crate::engine::worker::WorkerPool;
use crate::engine::{RuntimeEvent, SchedulerOptions};
use crate::store::ContextStore;

/// Drives the scheduler core in response to `RuntimeEvent`s and owns the IO:
/// the worker pool, retry timers, cancellation and store recording.
pub struct Runtime {
    options: SchedulerOptions,
    store: Option<Arc<ContextStore>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Runtime {
    pub fn new(options: SchedulerOptions) -> Self {
        Self {
            options,
            store: None,
        }
    }

    /// Attach a context store: it is handed to every unit of work, and task
    /// outcomes are recorded in it.
    pub fn with_store(mut self, store: Arc<ContextStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Execute every task in `graph` and return the summary.
    pub async fn run(&self, graph: TaskGraph) -> ExecutionSummary {
        let workers = if self.options.max_parallelism == 0 {
            warn!("max_parallelism = 0; running with a single worker");
            1
        } else {
            self.options.max_parallelism
        };

        let mut core = CoreRuntime::new(Scheduler::new(graph, self.options.fail_fast));
        let (event_tx, mut event_rx) = mpsc::channel::<RuntimeEvent>(64);
        let cancel = CancellationToken::new();
        let pool = WorkerPool::spawn(workers, event_tx.clone(), self.store.clone(), cancel.clone());
        let mut timers = JoinSet::new();

        info!(
            workers,
            fail_fast = self.options.fail_fast,
            "rundag runtime started"
        );

        let first = core.start();
        let mut keep_running = first.keep_running;
        for command in first.commands {
            self.execute_command(command, &pool, &event_tx, &cancel, &mut timers);
        }

        while keep_running {
            let Some(event) = event_rx.recv().await else {
                warn!("runtime event channel closed before run finished");
                break;
            };
            debug!(?event, "runtime received event");

            let step = core.step(event);
            for command in step.commands {
                self.execute_command(command, &pool, &event_tx, &cancel, &mut timers);
            }
            keep_running = step.keep_running;
        }

        timers.abort_all();
        drop(event_tx);
        drop(event_rx);
        pool.shutdown().await;

        let summary = core.summary();
        info!(
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            halted = summary.halted,
            "run finished"
        );
        summary
    }

    fn execute_command(
        &self,
        command: CoreCommand,
        pool: &WorkerPool,
        event_tx: &mpsc::Sender<RuntimeEvent>,
        cancel: &CancellationToken,
        timers: &mut JoinSet<()>,
    ) {
        match command {
            CoreCommand::Dispatch(tasks) => {
                let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
                debug!(?ids, "dispatching ready tasks");
                pool.enqueue(tasks);
            }
            CoreCommand::ArmRetry(retry) => arm_retry(retry, event_tx.clone(), timers),
            CoreCommand::Halt => {
                info!("halting: no new tasks will be started");
                cancel.cancel();
            }
            CoreCommand::Record(record) => self.record(record),
        }
    }

    fn record(&self, record: RunRecord) {
        let Some(store) = &self.store else {
            return;
        };

        match record {
            RunRecord::Completed {
                task,
                attempts,
                output,
            } => {
                if !output.is_null() {
                    store.set(format!("task.{task}.output"), output);
                }
                store.append_event("task_completed", json!({ "task": task, "attempts": attempts }));
            }
            RunRecord::Failed {
                task,
                attempts,
                error,
            } => {
                store.append_event(
                    "task_failed",
                    json!({ "task": task, "attempts": attempts, "error": error }),
                );
            }
            RunRecord::Skipped { task, reason } => {
                let reason = reason
                    .and_then(|r| serde_json::to_value(r).ok())
                    .unwrap_or(Value::Null);
                store.append_event("task_skipped", json!({ "task": task, "reason": reason }));
            }
        }
    }
}

/// Sleep out the backoff off the event loop, then report the retry as due.
fn arm_retry(retry: RetryRequest, event_tx: mpsc::Sender<RuntimeEvent>, timers: &mut JoinSet<()>) {
    let delay = with_jitter(retry.delay, &mut rand::rng());
    debug!(
        task = %retry.id,
        failed_attempt = retry.failed_attempt,
        delay_ms = delay.as_millis() as u64,
        "arming retry timer"
    );

    timers.spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = event_tx.send(RuntimeEvent::RetryDue { task: retry.id }).await;
    });
}
