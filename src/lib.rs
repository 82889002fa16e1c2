// src/lib.rs

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod store;

use std::sync::Arc;

use tracing::info;

use crate::dag::{ExecutionSummary, TaskDescriptor, TaskGraph};
use crate::engine::{Runtime, SchedulerOptions};
use crate::errors::GraphError;
use crate::store::ContextStore;

/// High-level entry point: validate `descriptors` and run them to completion.
///
/// This wires together:
/// - graph validation (structural errors abort before anything runs)
/// - scheduler / worker pool / runtime
///
/// Per-task failures never surface here; they are reported in the returned
/// [`ExecutionSummary`].
pub async fn run_graph<I>(
    descriptors: I,
    options: SchedulerOptions,
) -> Result<ExecutionSummary, GraphError>
where
    I: IntoIterator<Item = TaskDescriptor>,
{
    let graph = TaskGraph::build(descriptors)?;
    info!(tasks = graph.len(), "task graph built");
    Ok(Runtime::new(options).run(graph).await)
}

/// Like [`run_graph`], with `store` handed to every unit of work and task
/// outcomes recorded in it. Persisting the store stays with the caller.
pub async fn run_graph_with_store<I>(
    descriptors: I,
    options: SchedulerOptions,
    store: Arc<ContextStore>,
) -> Result<ExecutionSummary, GraphError>
where
    I: IntoIterator<Item = TaskDescriptor>,
{
    let graph = TaskGraph::build(descriptors)?;
    info!(tasks = graph.len(), store = %store.id(), "task graph built");
    Ok(Runtime::new(options).with_store(store).run(graph).await)
}
