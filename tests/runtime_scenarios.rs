// tests/runtime_scenarios.rs

mod common;
use crate::common::builders::{counted, failing, flaky, noop, sleeping};
use crate::common::{
    ConcurrencyProbe, RUN_LIMIT, TestResult, init_tracing, options, status, with_timeout,
};

use std::sync::atomic::Ordering;
use std::time::Duration;

use rundag::dag::{SkipReason, TaskContext, TaskDescriptor, TaskStatus};
use rundag::run_graph;
use serde_json::{Value, json};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_a_independent_tasks_overlap_and_join_waits() -> TestResult {
    init_tracing();

    let probe = ConcurrencyProbe::new();
    let hold = Duration::from_millis(150);
    let tasks = [
        probe.task("A", hold),
        probe.task("B", hold),
        probe.task("C", hold).depends_on(["A", "B"]),
    ];

    let summary = with_timeout(RUN_LIMIT, run_graph(tasks, options(2, false))).await?;

    assert_eq!(
        (summary.completed, summary.failed, summary.skipped),
        (3, 0, 0)
    );
    assert!(summary.is_success());
    assert_eq!(summary.success_rate(), 1.0);

    let a = probe.span("A").expect("A ran");
    let b = probe.span("B").expect("B ran");
    let c = probe.span("C").expect("C ran");
    assert!(a.start < b.end && b.start < a.end, "A and B should overlap");
    assert!(c.start > a.end && c.start > b.end, "C started before its dependencies ended");
    assert_eq!(probe.max_in_flight(), 2);

    // Same ordering through the summary's timestamps.
    let c_started = summary.task("C").and_then(|t| t.started_at).expect("C started");
    for dep in ["A", "B"] {
        let ended = summary.task(dep).and_then(|t| t.ended_at).expect("dep ended");
        assert!(c_started > ended, "C started before {dep} completed");
    }
    Ok(())
}

#[tokio::test]
async fn scenario_b_exhausted_retries_fail_and_skip_dependents() -> TestResult {
    init_tracing();

    let (e, e_calls) = counted("E");
    let tasks = [failing("D").max_attempts(3), e.depends_on(["D"])];

    let summary = with_timeout(RUN_LIMIT, run_graph(tasks, options(2, false))).await?;

    assert_eq!((summary.failed, summary.skipped), (1, 1));
    let d = summary.task("D").expect("D in summary");
    assert_eq!(d.status, TaskStatus::Failed);
    assert_eq!(d.attempts, 3);
    assert!(d.error.as_deref().is_some_and(|e| e.contains("boom (attempt 3)")));

    let e = summary.task("E").expect("E in summary");
    assert_eq!(e.status, TaskStatus::Skipped);
    assert_eq!(e.attempts, 0);
    assert!(e.started_at.is_none());
    assert_eq!(
        e.skip_reason,
        Some(SkipReason::UpstreamFailed {
            upstream: "D".to_string()
        })
    );
    assert_eq!(e_calls.load(Ordering::SeqCst), 0, "E must never run");
    Ok(())
}

#[tokio::test]
async fn first_attempt_success_reports_one_attempt_and_output() -> TestResult {
    init_tracing();

    let summary = with_timeout(RUN_LIMIT, run_graph([noop("only")], options(1, false))).await?;

    let t = summary.task("only").expect("task in summary");
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.attempts, 1);
    assert_eq!(t.output, Some(json!({ "task": "only" })));
    assert!(t.error.is_none());
    assert!(t.elapsed.is_some());
    Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() -> TestResult {
    init_tracing();

    let (task, calls) = flaky("flaky", 2);
    let summary = with_timeout(
        RUN_LIMIT,
        run_graph([task.max_attempts(3), noop("next").depends_on(["flaky"])], options(2, false)),
    )
    .await?;

    let t = summary.task("flaky").expect("flaky in summary");
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.attempts, 3);
    assert!(t.error.is_none(), "last error cleared on success");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(status(&summary, "next"), TaskStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn timeout_fails_the_attempt() -> TestResult {
    init_tracing();

    let task = sleeping("slow", Duration::from_secs(30))
        .timeout(Duration::from_millis(50))
        .max_attempts(1);
    let summary = with_timeout(RUN_LIMIT, run_graph([task], options(1, false))).await?;

    let t = summary.task("slow").expect("slow in summary");
    assert_eq!(t.status, TaskStatus::Failed);
    assert_eq!(t.attempts, 1);
    assert!(t.error.as_deref().is_some_and(|e| e.contains("timed out")));
    Ok(())
}

#[tokio::test]
async fn timeout_consumes_an_attempt_and_is_retried() -> TestResult {
    init_tracing();

    let task = TaskDescriptor::new("warmup", |ctx: TaskContext| async move {
        if ctx.attempt() == 1 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok::<_, anyhow::Error>(json!(ctx.attempt()))
    })
    .timeout(Duration::from_millis(50))
    .max_attempts(2)
    .base_backoff(Duration::from_millis(5))
    .max_backoff(Duration::from_millis(5));

    let summary = with_timeout(RUN_LIMIT, run_graph([task], options(1, false))).await?;

    let t = summary.task("warmup").expect("warmup in summary");
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.attempts, 2);
    assert_eq!(t.output, Some(json!(2)));
    Ok(())
}

#[tokio::test]
async fn panicking_work_is_reported_as_a_failure() -> TestResult {
    init_tracing();

    let task = TaskDescriptor::new("panics", |_ctx: TaskContext| async move {
        if true {
            panic!("unit of work exploded");
        }
        Ok::<_, anyhow::Error>(Value::Null)
    })
    .max_attempts(1);

    let summary =
        with_timeout(RUN_LIMIT, run_graph([task, noop("fine")], options(2, false))).await?;

    assert_eq!(status(&summary, "panics"), TaskStatus::Failed);
    assert_eq!(status(&summary, "fine"), TaskStatus::Completed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_tasks_never_exceed_max_parallelism() -> TestResult {
    init_tracing();

    let probe = ConcurrencyProbe::new();
    let mut tasks: Vec<TaskDescriptor> = (0..10)
        .map(|i| probe.task(&format!("t{i}"), Duration::from_millis(40)))
        .collect();
    tasks.push(probe.task("join", Duration::from_millis(10)).depends_on(["t0", "t9"]));

    let summary = with_timeout(RUN_LIMIT, run_graph(tasks, options(3, false))).await?;

    assert_eq!(summary.completed, 11);
    assert!(probe.max_in_flight() <= 3, "saw {}", probe.max_in_flight());
    assert!(probe.max_in_flight() >= 1);
    Ok(())
}

#[tokio::test]
async fn failures_stay_isolated_without_fail_fast() -> TestResult {
    init_tracing();

    let tasks = [
        failing("bad").max_attempts(1),
        noop("child").depends_on(["bad"]),
        noop("sibling"),
        noop("sibling_child").depends_on(["sibling"]),
    ];
    let summary = with_timeout(RUN_LIMIT, run_graph(tasks, options(2, false))).await?;

    assert_eq!(status(&summary, "bad"), TaskStatus::Failed);
    assert_eq!(status(&summary, "child"), TaskStatus::Skipped);
    assert_eq!(status(&summary, "sibling"), TaskStatus::Completed);
    assert_eq!(status(&summary, "sibling_child"), TaskStatus::Completed);
    assert!(!summary.halted);
    assert_eq!(summary.success_rate(), 0.5);
    Ok(())
}

#[tokio::test]
async fn fail_fast_lets_running_work_finish_but_admits_nothing_new() -> TestResult {
    init_tracing();

    let (after_slow, after_calls) = counted("after_slow");
    let tasks = [
        failing("bad").max_attempts(1),
        sleeping("slow", Duration::from_millis(200)),
        after_slow.depends_on(["slow"]),
    ];

    let summary = with_timeout(RUN_LIMIT, run_graph(tasks, options(2, true))).await?;

    assert!(summary.halted);
    assert_eq!(status(&summary, "bad"), TaskStatus::Failed);
    assert_eq!(status(&summary, "slow"), TaskStatus::Completed);
    assert_eq!(status(&summary, "after_slow"), TaskStatus::Skipped);
    assert_eq!(
        summary.task("after_slow").and_then(|t| t.skip_reason.clone()),
        Some(SkipReason::Halted)
    );
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn fail_fast_cancellation_token_is_visible_to_running_work() -> TestResult {
    init_tracing();

    let watcher = TaskDescriptor::new("watcher", |ctx: TaskContext| async move {
        tokio::select! {
            _ = ctx.cancellation().cancelled() => Ok::<_, anyhow::Error>(json!("cancelled")),
            _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(json!("timed out")),
        }
    });
    let tasks = [watcher, failing("bad").max_attempts(1)];

    let summary = with_timeout(RUN_LIMIT, run_graph(tasks, options(2, true))).await?;

    assert_eq!(
        summary.task("watcher").and_then(|t| t.output.clone()),
        Some(json!("cancelled"))
    );
    Ok(())
}

#[tokio::test]
async fn structural_errors_abort_before_anything_runs() -> TestResult {
    init_tracing();

    let (a, calls) = counted("A");
    let result = run_graph([a, noop("B").depends_on(["nope"])], options(2, false)).await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn empty_graph_yields_empty_summary() -> TestResult {
    init_tracing();

    let summary = with_timeout(
        RUN_LIMIT,
        run_graph(Vec::<TaskDescriptor>::new(), options(4, false)),
    )
    .await?;

    assert_eq!(summary.total, 0);
    assert_eq!(summary.success_rate(), 0.0);
    assert!(summary.tasks.is_empty());
    Ok(())
}

#[tokio::test]
async fn zero_parallelism_still_makes_progress() -> TestResult {
    init_tracing();

    let summary = with_timeout(
        RUN_LIMIT,
        run_graph([noop("A"), noop("B").depends_on(["A"])], options(0, false)),
    )
    .await?;

    assert_eq!(summary.completed, 2);
    Ok(())
}
