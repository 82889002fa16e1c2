// src/dag/descriptor.rs

//! Task descriptors: the fixed-shape record a caller hands to the scheduler.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::TaskDefaults;
use crate::dag::retry::RetryPolicy;
use crate::errors::GraphError;
use crate::store::ContextStore;

/// Canonical task identifier type.
pub type TaskId = String;

/// Default per-attempt timeout (five minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Boxed future returned by a unit of work.
pub type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// An executable unit of work, opaque to the scheduler.
///
/// Implemented for any `Fn(TaskContext) -> impl Future<Output = anyhow::Result<Value>>`,
/// so plain async closures can be used directly.
pub trait Work: Send + Sync {
    fn call(&self, ctx: TaskContext) -> WorkFuture;
}

impl<F, Fut> Work for F
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn call(&self, ctx: TaskContext) -> WorkFuture {
        Box::pin(self(ctx))
    }
}

/// What a unit of work sees while it runs.
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    attempt: u32,
    store: Option<Arc<ContextStore>>,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        attempt: u32,
        store: Option<Arc<ContextStore>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            attempt,
            store,
            cancel,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Shared context store attached to the run, if any.
    pub fn store(&self) -> Option<&Arc<ContextStore>> {
        self.store.as_ref()
    }

    /// Cancelled when the run halts under fail-fast. Long-running work may
    /// poll this to stop early; the scheduler never forces it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

/// Caller-supplied description of one task.
#[derive(Clone)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub name: String,
    pub depends_on: Vec<TaskId>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub work: Arc<dyn Work>,
}

impl TaskDescriptor {
    /// Descriptor around an async closure, with default timeout and retry
    /// policy. The name defaults to the id.
    pub fn new<F, Fut>(id: impl Into<TaskId>, work: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::from_work(id, work)
    }

    /// Descriptor around any [`Work`] implementation.
    pub fn from_work<W>(id: impl Into<TaskId>, work: W) -> Self
    where
        W: Work + 'static,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            depends_on: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            work: Arc::new(work),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.retry.base_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.retry.max_backoff = backoff;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Replace timeout and retry policy with configured defaults.
    pub fn with_defaults(mut self, defaults: &TaskDefaults) -> Self {
        self.timeout = defaults.timeout;
        self.retry = defaults.retry;
        self
    }

    /// Shape checks that do not need the rest of the graph.
    pub fn validate(&self) -> Result<(), GraphError> {
        let invalid = |reason: &str| GraphError::InvalidDescriptor {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("max_attempts must be >= 1"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if self.retry.base_backoff > self.retry.max_backoff {
            return Err(invalid("base_backoff must not exceed max_backoff"));
        }
        Ok(())
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
