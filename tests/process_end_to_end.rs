// tests/process_end_to_end.rs

//! Real child processes through the production launcher.

#![cfg(unix)]

use std::io;

use cmdtask::engine::{Scheduler, WorkerPool};
use cmdtask::task::{RunFailure, TaskError, TaskSpec, TaskState};
use cmdtask_test_utils::builders::{fast_settings, sh, ProgressLog};
use cmdtask_test_utils::{init_tracing, wait_for_state, with_timeout};
use tempfile::TempDir;

fn scheduler() -> Scheduler {
    Scheduler::new(WorkerPool::new(2), fast_settings())
}

#[tokio::test]
async fn progress_from_stdout_reaches_callback() {
    init_tracing();
    let sched = scheduler();
    let log = ProgressLog::new();

    let handle = sched.submit(log.attach(sh(
        "printf '<filter-start name=\"Blur\"/>\\n'; \
         echo plain output; \
         printf '<filter-progress progress=\"0.5\"/>\\n'",
    )));

    assert_eq!(with_timeout(handle.result()).await, Ok(()));
    assert_eq!(log.values(), vec![1, 500, 1000]);
    assert_eq!(handle.progress().text, "Blur");
    sched.shutdown().await;
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    init_tracing();
    let sched = scheduler();
    let log = ProgressLog::new();

    let spec = TaskSpec::new("/nonexistent/cmdtask/module", Vec::<String>::new());
    let handle = sched.submit(log.attach(spec));

    match with_timeout(handle.result()).await {
        Err(TaskError::Spawn(e)) => assert_eq!(e.kind, io::ErrorKind::NotFound),
        other => panic!("expected spawn error, got {other:?}"),
    }
    assert_eq!(handle.state(), TaskState::Failed);
    assert!(log.is_empty());
    sched.shutdown().await;
}

#[tokio::test]
async fn failing_module_reports_stderr() {
    init_tracing();
    let sched = scheduler();

    let handle = sched.submit(sh("echo boom >&2; exit 2"));

    match with_timeout(handle.result()).await {
        Err(TaskError::Run(e)) => {
            assert_eq!(e.exit_code, Some(2));
            assert_eq!(e.failure, RunFailure::NonZeroExit);
            assert_eq!(e.diagnostic, "boom");
            assert_eq!(e.program, "sh");
        }
        other => panic!("expected run failure, got {other:?}"),
    }
    let progress = handle.progress();
    assert_eq!(progress.value, 1000);
    assert_eq!(progress.text, "boom");
    sched.shutdown().await;
}

#[tokio::test]
async fn working_dir_and_env_are_applied() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let marker = dir
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap()
        .to_string();
    let sched = scheduler();

    let spec = sh("echo \"$GREETING from $(pwd)\" >&2; exit 1")
        .working_dir(dir.path())
        .env("GREETING", "hello");
    let handle = sched.submit(spec);

    match with_timeout(handle.result()).await {
        Err(TaskError::Run(e)) => {
            assert!(e.diagnostic.starts_with("hello from "), "{}", e.diagnostic);
            assert!(e.diagnostic.contains(&marker), "{}", e.diagnostic);
        }
        other => panic!("expected run failure, got {other:?}"),
    }
    sched.shutdown().await;
}

#[tokio::test]
async fn cancel_terminates_a_running_process() {
    init_tracing();
    let sched = scheduler();

    let handle = sched.submit(sh("exec sleep 30"));
    wait_for_state(&handle, TaskState::Running).await;

    handle.cancel();
    assert_eq!(with_timeout(handle.result()).await, Err(TaskError::Canceled));
    assert_eq!(handle.state(), TaskState::Canceled);
    assert!(handle.progress().is_complete());
    sched.shutdown().await;
}

#[tokio::test]
async fn pause_resume_then_cancel() {
    init_tracing();
    let sched = scheduler();

    let handle = sched.submit(sh("exec sleep 30"));
    assert!(handle.can_pause());
    wait_for_state(&handle, TaskState::Running).await;

    handle.pause().unwrap();
    wait_for_state(&handle, TaskState::Paused).await;

    handle.resume().unwrap();
    wait_for_state(&handle, TaskState::Running).await;

    handle.pause().unwrap();
    wait_for_state(&handle, TaskState::Paused).await;

    // A stopped process still has to honour the cancel.
    handle.cancel();
    assert_eq!(with_timeout(handle.result()).await, Err(TaskError::Canceled));
    sched.shutdown().await;
}

const MANY_LINES: &str = "i=0; while [ $i -lt 2000 ]; do echo \"line $i\"; i=$((i+1)); done";

#[tokio::test]
async fn non_utf8_stdout_does_not_break_the_pipe() {
    init_tracing();
    let sched = scheduler();
    let log = ProgressLog::new();

    let script = format!(
        "printf 'caf\\351\\n'; sleep 0.3; {MANY_LINES}; \
         printf '<filter-progress progress=\"0.5\"/>\\n'; exit 0"
    );
    let handle = sched.submit(log.attach(sh(&script)));

    assert_eq!(with_timeout(handle.result()).await, Ok(()));
    assert_eq!(handle.state(), TaskState::Completed);
    assert_eq!(log.values(), vec![500, 1000]);
    sched.shutdown().await;
}

#[tokio::test]
async fn non_utf8_stderr_does_not_break_the_pipe() {
    init_tracing();
    let sched = scheduler();

    let script = format!(
        "printf 'caf\\351\\n' >&2; sleep 0.3; {{ {MANY_LINES}; }} >&2; exit 0"
    );
    let handle = sched.submit(sh(&script));

    assert_eq!(with_timeout(handle.result()).await, Ok(()));
    let text = handle.progress().text;
    assert!(text.starts_with("caf\u{FFFD}"), "{text}");
    assert!(text.ends_with("line 1999"), "{text}");
    sched.shutdown().await;
}
