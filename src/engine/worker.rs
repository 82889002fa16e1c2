// src/engine/worker.rs

//! Bounded worker pool draining the ready queue.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{AttemptOutcome, ScheduledTask, TaskContext};
use crate::engine::RuntimeEvent;
use crate::errors::TaskError;
use crate::store::ContextStore;

/// Fixed-size set of workers sharing one ready queue.
///
/// Each worker runs at most one attempt at a time, so the number of running
/// tasks can never exceed the pool size, however long the queue grows.
pub struct WorkerPool {
    ready_tx: mpsc::UnboundedSender<ScheduledTask>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers reporting to `runtime_tx`.
    pub fn spawn(
        size: usize,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        store: Option<Arc<ContextStore>>,
        cancel: CancellationToken,
    ) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel::<ScheduledTask>();
        let ready_rx = Arc::new(Mutex::new(ready_rx));

        let handles = (0..size)
            .map(|worker_id| {
                let ready_rx = Arc::clone(&ready_rx);
                let runtime_tx = runtime_tx.clone();
                let store = store.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, ready_rx, runtime_tx, store, cancel).await;
                })
            })
            .collect();

        info!(workers = size, "worker pool started");
        Self { ready_tx, handles }
    }

    /// Push tasks into the ready queue.
    pub fn enqueue(&self, tasks: Vec<ScheduledTask>) {
        for task in tasks {
            let id = task.id.clone();
            if self.ready_tx.send(task).is_err() {
                warn!(task = %id, "ready queue closed; dropping task");
            }
        }
    }

    /// Close the ready queue and wait for every worker to exit.
    pub async fn shutdown(self) {
        drop(self.ready_tx);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        debug!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    ready_rx: Arc<Mutex<mpsc::UnboundedReceiver<ScheduledTask>>>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    store: Option<Arc<ContextStore>>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = ready_rx.lock().await;
            rx.recv().await
        };
        let Some(task) = next else {
            break;
        };

        if cancel.is_cancelled() {
            debug!(worker_id, task = %task.id, "run halted; discarding queued task");
            let discarded = RuntimeEvent::TaskDiscarded {
                task: task.id,
                at: Utc::now(),
            };
            if runtime_tx.send(discarded).await.is_err() {
                break;
            }
            continue;
        }

        let started = RuntimeEvent::TaskStarted {
            task: task.id.clone(),
            attempt: task.attempt,
            at: Utc::now(),
        };
        if runtime_tx.send(started).await.is_err() {
            break;
        }

        debug!(worker_id, task = %task.id, attempt = task.attempt, "running attempt");
        let ctx = TaskContext::new(task.id.clone(), task.attempt, store.clone(), cancel.clone());
        let outcome = run_attempt(&task, ctx).await;

        let finished = RuntimeEvent::AttemptFinished {
            task: task.id,
            attempt: task.attempt,
            at: Utc::now(),
            outcome,
        };
        if runtime_tx.send(finished).await.is_err() {
            break;
        }
    }

    debug!(worker_id, "worker exiting");
}

/// Run one attempt under its deadline.
///
/// The work runs in its own Tokio task so a panic is reported as an
/// execution error instead of taking the worker down. On timeout the task is
/// aborted, which cancels it at its next await point.
async fn run_attempt(task: &ScheduledTask, ctx: TaskContext) -> AttemptOutcome {
    let mut handle = tokio::spawn(task.work.call(ctx));

    match tokio::time::timeout(task.timeout, &mut handle).await {
        Ok(Ok(Ok(output))) => AttemptOutcome::Success(output),
        Ok(Ok(Err(err))) => AttemptOutcome::Failed(TaskError::Execution {
            id: task.id.clone(),
            message: format!("{err:#}"),
        }),
        Ok(Err(join_err)) => AttemptOutcome::Failed(TaskError::Execution {
            id: task.id.clone(),
            message: if join_err.is_panic() {
                "unit of work panicked".to_string()
            } else {
                join_err.to_string()
            },
        }),
        Err(_elapsed) => {
            handle.abort();
            AttemptOutcome::Failed(TaskError::Timeout {
                id: task.id.clone(),
                timeout: task.timeout,
            })
        }
    }
}
