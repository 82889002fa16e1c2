#![allow(dead_code)]

use std::time::Duration;

use rundag::dag::{ExecutionSummary, TaskStatus};
use rundag::engine::SchedulerOptions;

pub use rundag_test_utils::builders;
pub use rundag_test_utils::init_tracing;
pub use rundag_test_utils::probe::ConcurrencyProbe;
pub use rundag_test_utils::with_timeout;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Upper bound for any single run in these tests.
pub const RUN_LIMIT: Duration = Duration::from_secs(10);

pub fn options(max_parallelism: usize, fail_fast: bool) -> SchedulerOptions {
    SchedulerOptions::new(max_parallelism, fail_fast)
}

pub fn status(summary: &ExecutionSummary, id: &str) -> TaskStatus {
    summary
        .task(id)
        .unwrap_or_else(|| panic!("task {id} missing from summary"))
        .status
}
