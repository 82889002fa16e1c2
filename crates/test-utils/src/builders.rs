#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rundag::dag::{TaskContext, TaskDescriptor};
use serde_json::{Value, json};

/// Tiny backoffs so retrying tests finish quickly.
pub const FAST_BACKOFF: Duration = Duration::from_millis(5);

/// A task that succeeds immediately with `{"task": <id>}`.
pub fn noop(id: &str) -> TaskDescriptor {
    TaskDescriptor::new(id, |ctx: TaskContext| async move {
        Ok::<_, anyhow::Error>(json!({ "task": ctx.task_id() }))
    })
    .base_backoff(FAST_BACKOFF)
    .max_backoff(FAST_BACKOFF)
}

/// A task that fails on every attempt.
pub fn failing(id: &str) -> TaskDescriptor {
    TaskDescriptor::new(id, |ctx: TaskContext| async move {
        Err::<Value, _>(anyhow::anyhow!("boom (attempt {})", ctx.attempt()))
    })
    .base_backoff(FAST_BACKOFF)
    .max_backoff(FAST_BACKOFF)
}

/// A task that fails its first `failures` attempts, then succeeds. The
/// returned counter is the number of times the work was invoked.
pub fn flaky(id: &str, failures: u32) -> (TaskDescriptor, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let desc = TaskDescriptor::new(id, move |ctx: TaskContext| {
        let counter = Arc::clone(&counter);
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                anyhow::bail!("transient failure {n}");
            }
            Ok(json!({ "task": ctx.task_id(), "calls": n }))
        }
    })
    .base_backoff(FAST_BACKOFF)
    .max_backoff(FAST_BACKOFF);

    (desc, calls)
}

/// A task that sleeps for `duration` and then succeeds.
pub fn sleeping(id: &str, duration: Duration) -> TaskDescriptor {
    TaskDescriptor::new(id, move |_ctx: TaskContext| async move {
        tokio::time::sleep(duration).await;
        Ok::<_, anyhow::Error>(Value::Null)
    })
    .base_backoff(FAST_BACKOFF)
    .max_backoff(FAST_BACKOFF)
}

/// A task that counts its invocations and always succeeds.
pub fn counted(id: &str) -> (TaskDescriptor, Arc<AtomicU32>) {
    flaky(id, 0)
}
