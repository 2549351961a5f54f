// tests/fake_runner.rs

//! Task runner behaviour against scripted processes.

use std::io;
use std::time::Duration;

use cmdtask::engine::{Scheduler, WorkerPool};
use cmdtask::exec::{ExitReport, ProcessSettings};
use cmdtask::hosting::{AvailableData, Patient};
use cmdtask::task::{ControlError, RunFailure, TaskError, TaskSpec, TaskState};
use cmdtask_test_utils::builders::{fast_settings, ProgressLog};
use cmdtask_test_utils::fake_process::{FakeLauncher, ProcessCall};
use cmdtask_test_utils::{init_tracing, wait_for_progress, wait_for_state, with_timeout};

fn scheduler(workers: usize, suspension: bool) -> Scheduler<FakeLauncher> {
    scheduler_with(workers, suspension, fast_settings())
}

fn scheduler_with(
    workers: usize,
    suspension: bool,
    settings: ProcessSettings,
) -> Scheduler<FakeLauncher> {
    Scheduler::with_launcher(
        WorkerPool::new(workers),
        FakeLauncher::new(suspension),
        settings,
    )
}

fn module() -> TaskSpec {
    TaskSpec::new("/opt/modules/blur", ["--sigma", "2"])
}

#[tokio::test]
async fn successful_run_completes_with_full_progress() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();
    let log = ProgressLog::new();

    let handle = sched.submit(log.attach(module()));
    wait_for_state(&handle, TaskState::Running).await;

    process
        .write_stdout("<filter-start name=\"Blur\"/>\n<filter-progress progress=\"0.5\"/>\n")
        .await;
    assert_eq!(wait_for_progress(&handle, |v| v == 500).await, 500);

    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(handle.result()).await, Ok(()));

    assert_eq!(handle.state(), TaskState::Completed);
    assert_eq!(log.values(), vec![1, 500, 1000]);
    assert_eq!(log.texts().last().map(String::as_str), Some("Blur"));
    assert_eq!(
        sched.launcher().launched(),
        vec![(
            "/opt/modules/blur".to_string(),
            vec!["--sigma".to_string(), "2".to_string()]
        )]
    );
}

#[tokio::test]
async fn stderr_becomes_final_progress_text() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;

    process.write_stderr("warning: low memory\n").await;
    process.exit(ExitReport::Exited(0)).await;

    assert_eq!(with_timeout(handle.result()).await, Ok(()));
    let progress = handle.progress();
    assert!(progress.is_complete());
    assert_eq!(progress.text, "warning: low memory");
}

#[tokio::test]
async fn spawn_failure_fails_without_progress() {
    init_tracing();
    // Nothing scripted: the launch fails with NotFound.
    let sched = scheduler(1, true);
    let log = ProgressLog::new();

    let handle = sched.submit(log.attach(module()));
    let result = with_timeout(handle.result()).await;

    match result {
        Err(TaskError::Spawn(e)) => {
            assert_eq!(e.kind, io::ErrorKind::NotFound);
            assert_eq!(e.program, "/opt/modules/blur");
        }
        other => panic!("expected spawn error, got {other:?}"),
    }
    assert_eq!(handle.state(), TaskState::Failed);
    assert!(log.is_empty());
    assert_eq!(handle.progress().value, 0);
}

#[tokio::test]
async fn non_zero_exit_carries_code_and_stderr() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;

    process.write_stderr("boom\n").await;
    process.exit(ExitReport::Exited(2)).await;

    match with_timeout(handle.result()).await {
        Err(TaskError::Run(e)) => {
            assert_eq!(e.exit_code, Some(2));
            assert_eq!(e.failure, RunFailure::NonZeroExit);
            assert_eq!(e.diagnostic, "boom");
        }
        other => panic!("expected run failure, got {other:?}"),
    }
    assert_eq!(handle.state(), TaskState::Failed);
    assert_eq!(handle.progress().value, 1000);
}

#[tokio::test]
async fn signal_death_is_a_crash() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;
    process.exit(ExitReport::Signaled(Some(11))).await;

    match with_timeout(handle.result()).await {
        Err(TaskError::Run(e)) => {
            assert_eq!(e.exit_code, None);
            assert_eq!(e.failure, RunFailure::Crashed);
            assert!(e.diagnostic.contains("signal 11"), "{}", e.diagnostic);
        }
        other => panic!("expected crash, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_failure_uses_os_message() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;
    process.write_stderr("unrelated noise\n").await;
    process
        .exit(ExitReport::WaitFailed("no child processes".to_string()))
        .await;

    match with_timeout(handle.result()).await {
        Err(TaskError::Run(e)) => {
            assert_eq!(e.failure, RunFailure::WaitFailed);
            assert_eq!(e.diagnostic, "no child processes");
        }
        other => panic!("expected wait failure, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_before_start_never_launches() {
    init_tracing();
    let sched = scheduler(1, true);
    let blocker = sched.launcher().script();

    let first = sched.submit(module());
    wait_for_state(&first, TaskState::Running).await;

    let log = ProgressLog::new();
    let queued = sched.submit(log.attach(module()));
    assert_eq!(queued.state(), TaskState::Started);
    queued.cancel();

    blocker.exit(ExitReport::Exited(0)).await;

    assert_eq!(with_timeout(queued.result()).await, Err(TaskError::Canceled));
    assert_eq!(queued.state(), TaskState::Canceled);
    assert_eq!(sched.launcher().launch_count(), 1);
    assert!(log.is_empty());
}

#[tokio::test]
async fn cancel_terminates_exactly_once() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;

    handle.cancel();
    handle.cancel();
    assert!(handle.is_cancel_requested());

    assert_eq!(with_timeout(handle.result()).await, Err(TaskError::Canceled));
    assert_eq!(handle.state(), TaskState::Canceled);
    assert_eq!(process.count(ProcessCall::Terminate), 1);
    assert_eq!(process.count(ProcessCall::Kill), 0);

    // Cancel after the fact is a no-op.
    handle.cancel();
    assert_eq!(process.count(ProcessCall::Terminate), 1);
}

#[tokio::test]
async fn ignored_terminate_escalates_to_kill() {
    init_tracing();
    let settings = ProcessSettings {
        terminate_grace: Some(Duration::from_millis(100)),
        ..fast_settings()
    };
    let sched = scheduler_with(1, true, settings);
    let process = sched.launcher().script();
    process.exit_on_terminate(false);

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;
    handle.cancel();

    assert_eq!(with_timeout(handle.result()).await, Err(TaskError::Canceled));
    assert_eq!(
        process.calls(),
        vec![ProcessCall::Terminate, ProcessCall::Kill]
    );
}

#[tokio::test]
async fn no_grace_means_no_kill() {
    init_tracing();
    let settings = ProcessSettings {
        terminate_grace: None,
        ..fast_settings()
    };
    let sched = scheduler_with(1, true, settings);
    let process = sched.launcher().script();
    process.exit_on_terminate(false);

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;
    handle.cancel();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(process.count(ProcessCall::Kill), 0);
    assert!(!handle.is_finished());

    process.exit(ExitReport::Signaled(Some(15))).await;
    assert_eq!(with_timeout(handle.result()).await, Err(TaskError::Canceled));
}

#[tokio::test]
async fn pause_and_resume_signal_the_process() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    assert!(handle.can_pause());
    wait_for_state(&handle, TaskState::Running).await;

    handle.pause().unwrap();
    wait_for_state(&handle, TaskState::Paused).await;

    // A repeated request does not signal again.
    handle.pause().unwrap();
    handle.resume().unwrap();
    wait_for_state(&handle, TaskState::Running).await;

    assert_eq!(process.calls(), vec![ProcessCall::Pause, ProcessCall::Resume]);

    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(handle.result()).await, Ok(()));
    assert_eq!(handle.pause(), Err(ControlError::Finished));
}

#[tokio::test]
async fn failed_pause_is_rolled_back() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();
    process.fail_signals(true);

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;

    handle.pause().unwrap();
    with_timeout(async {
        while handle.is_pause_requested() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert_eq!(handle.state(), TaskState::Running);
    assert!(process.count(ProcessCall::Pause) >= 1);

    process.fail_signals(false);
    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(handle.result()).await, Ok(()));
}

#[tokio::test]
async fn pause_is_unsupported_without_suspension() {
    init_tracing();
    let sched = scheduler(1, false);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    assert!(!handle.can_pause());
    wait_for_state(&handle, TaskState::Running).await;

    assert_eq!(handle.pause(), Err(ControlError::Unsupported));
    assert_eq!(handle.resume(), Err(ControlError::Unsupported));
    assert_eq!(handle.state(), TaskState::Running);
    assert!(process.calls().is_empty());

    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(handle.result()).await, Ok(()));
}

#[tokio::test]
async fn pause_requested_while_queued_is_applied_on_start() {
    init_tracing();
    let sched = scheduler(1, true);
    let blocker = sched.launcher().script();
    let process = sched.launcher().script();

    let first = sched.submit(module());
    wait_for_state(&first, TaskState::Running).await;

    let queued = sched.submit(module());
    queued.pause().unwrap();
    assert_eq!(queued.state(), TaskState::Started);

    blocker.exit(ExitReport::Exited(0)).await;
    wait_for_state(&queued, TaskState::Paused).await;
    assert_eq!(process.count(ProcessCall::Pause), 1);

    queued.resume().unwrap();
    wait_for_state(&queued, TaskState::Running).await;
    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(queued.result()).await, Ok(()));
}

#[tokio::test]
async fn cancel_while_paused_ends_canceled() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;
    handle.pause().unwrap();
    wait_for_state(&handle, TaskState::Paused).await;

    handle.cancel();
    assert_eq!(with_timeout(handle.result()).await, Err(TaskError::Canceled));
    assert_eq!(process.count(ProcessCall::Terminate), 1);
}

#[tokio::test]
async fn every_waiter_sees_the_same_outcome() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let h = handle.clone();
            tokio::spawn(async move { h.result().await })
        })
        .collect();

    wait_for_state(&handle, TaskState::Running).await;
    process.write_stderr("bad input\n").await;
    process.exit(ExitReport::Exited(3)).await;

    let mut outcomes = Vec::new();
    for w in waiters {
        outcomes.push(with_timeout(w).await.unwrap());
    }
    assert!(matches!(outcomes[0], Err(TaskError::Run(_))));
    assert!(outcomes.iter().all(|o| *o == outcomes[0]));

    // Late waiters too.
    assert_eq!(handle.result().await, outcomes[0]);
    assert_eq!(handle.try_result(), Some(outcomes[0].clone()));
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    init_tracing();
    let sched = scheduler(1, true);
    with_timeout(sched.shutdown()).await;
    assert!(sched.pool().is_closed());

    let handle = sched.submit(module());
    assert_eq!(handle.state(), TaskState::Failed);
    assert_eq!(handle.try_result(), Some(Err(TaskError::SchedulerClosed)));
    assert_eq!(sched.launcher().launch_count(), 0);
}

#[tokio::test]
async fn handles_expose_ids_and_payload() {
    init_tracing();
    let sched = scheduler(2, true);
    let a = sched.launcher().script();
    let b = sched.launcher().script();

    let payload = AvailableData {
        patients: vec![Patient {
            name: "Doe^Jane".to_string(),
            ..Patient::default()
        }],
        ..AvailableData::default()
    };

    let first = sched.submit(module().payload(payload.clone()));
    let second = sched.submit_command("/opt/modules/threshold", ["0.5"]);

    assert!(second.id() > first.id());
    assert_eq!(first.payload(), Some(&payload));
    assert_eq!(second.payload(), None);
    assert_eq!(second.program(), "/opt/modules/threshold");
    assert_eq!(second.args(), ["0.5".to_string()]);

    a.exit(ExitReport::Exited(0)).await;
    b.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(first.result()).await, Ok(()));
    assert_eq!(with_timeout(second.result()).await, Ok(()));
    with_timeout(sched.shutdown()).await;
}

#[tokio::test]
async fn cancel_racing_a_natural_exit_keeps_the_exit_outcome() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();
    process.exit_on_terminate(false);
    process.vanish();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;
    handle.cancel();

    with_timeout(async {
        while process.count(ProcessCall::Terminate) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(handle.result()).await, Ok(()));
    assert_eq!(handle.state(), TaskState::Completed);
    assert_eq!(process.count(ProcessCall::Terminate), 1);
    assert_eq!(process.count(ProcessCall::Kill), 0);
}

#[tokio::test]
async fn undelivered_terminate_does_not_turn_a_failure_into_a_cancel() {
    init_tracing();
    let settings = ProcessSettings {
        terminate_grace: None,
        ..fast_settings()
    };
    let sched = scheduler_with(1, true, settings);
    let process = sched.launcher().script();
    process.fail_signals(true);

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;
    handle.cancel();

    with_timeout(async {
        while process.count(ProcessCall::Terminate) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    process.exit(ExitReport::Exited(3)).await;
    match with_timeout(handle.result()).await {
        Err(TaskError::Run(e)) => assert_eq!(e.exit_code, Some(3)),
        other => panic!("expected run failure, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_utf8_on_stdout_keeps_the_pipe_open() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;

    process.write_stdout_bytes(b"caf\xe9\n").await;
    process.write_stderr_bytes(b"\xff\xfe warning\n").await;
    process
        .write_stdout("<filter-progress progress=\"0.5\"/>\n")
        .await;
    assert_eq!(wait_for_progress(&handle, |v| v == 500).await, 500);

    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(handle.result()).await, Ok(()));
    assert!(handle.progress().text.contains("\u{FFFD}"));
}

#[tokio::test]
async fn overlong_line_is_read_in_pieces() {
    init_tracing();
    let sched = scheduler(1, true);
    let process = sched.launcher().script();

    let handle = sched.submit(module());
    wait_for_state(&handle, TaskState::Running).await;

    let filler = vec![b'x'; 200 * 1024];
    process.write_stdout_bytes(&filler).await;
    process
        .write_stdout("<filter-progress progress=\"0.25\"/>\n")
        .await;
    assert_eq!(wait_for_progress(&handle, |v| v == 250).await, 250);

    process.exit(ExitReport::Exited(0)).await;
    assert_eq!(with_timeout(handle.result()).await, Ok(()));
}
