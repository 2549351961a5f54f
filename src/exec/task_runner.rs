// src/exec/task_runner.rs

//! Runs one task from spawn to terminal outcome on a worker.

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::progress::{Progress, PROGRESS_MAX};
use crate::task::{RunException, RunFailure, TaskError, TaskReporter, TaskResult};

use super::backend::{ExitReport, ManagedProcess, ProcessLauncher};
use super::output::{collect_stderr, LineReader, OutputLine, OutputMonitor};
use super::settings::ProcessSettings;
use super::signal::SignalError;

/// Cancellation bookkeeping for one run.
#[derive(Debug, Default)]
struct TerminateState {
    requested: bool,
    /// A terminate or kill signal actually reached the process.
    delivered: bool,
    kill_at: Option<Instant>,
}

/// Run a single task to completion.
///
/// - A task canceled before it got here is finished as `Canceled` without
///   spawning anything.
/// - Spawn failures finish the task immediately with no progress updates.
/// - Otherwise stdout feeds the progress parser until the process exits, and
///   the exit is classified into the task's single terminal outcome.
pub(crate) async fn run_task<L: ProcessLauncher>(
    launcher: &L,
    task: TaskReporter,
    settings: ProcessSettings,
) {
    if task.cancel_requested() {
        info!(
            task_id = task.id(),
            program = %task.program(),
            "task canceled before start; not spawning"
        );
        task.finish(Err(TaskError::Canceled), None);
        return;
    }

    let mut process = match launcher.launch(task.spec()) {
        Ok(process) => process,
        Err(err) => {
            error!(
                task_id = task.id(),
                program = %task.program(),
                error = %err,
                "failed to start module"
            );
            task.finish(Err(err.into()), None);
            return;
        }
    };

    task.mark_running();
    let program = task.program().to_string();

    let mut stderr_reader = process
        .take_stderr()
        .map(|s| tokio::spawn(collect_stderr(s, task.id(), program.clone())));
    let mut stdout = process.take_stdout().map(LineReader::new);

    let mut monitor = OutputMonitor::new(&program);
    let mut terminate = TerminateState::default();

    let mut poll = interval(settings.pause_poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Either the process exits, or we react to output and control requests
    // until it does.
    let exit = loop {
        let kill_at = terminate.kill_at;

        tokio::select! {
            report = process.wait_for_exit() => break report,

            line = next_line(&mut stdout) => match line {
                Some(line) => monitor.feed_line(&task, &line),
                None => {
                    debug!(task_id = task.id(), "stdout closed");
                    stdout = None;
                }
            },

            _ = task.control_changed() => {
                reconcile(&mut process, &task, &mut terminate, &settings);
            }

            _ = poll.tick() => {
                reconcile(&mut process, &task, &mut terminate, &settings);
            }

            _ = sleep_until_opt(kill_at) => {
                warn!(
                    task_id = task.id(),
                    program = %program,
                    grace = ?settings.terminate_grace,
                    "process ignored termination request; killing"
                );
                terminate.kill_at = None;
                match process.kill() {
                    Ok(()) => terminate.delivered = true,
                    Err(e) => warn!(task_id = task.id(), error = %e, "failed to kill process"),
                }
            }
        }
    };

    info!(
        task_id = task.id(),
        program = %program,
        exit = %exit,
        "module process exited"
    );

    if let Some(reader) = stdout.as_mut() {
        let drained = timeout(settings.stdout_drain_timeout, async {
            while let Some(line) = reader.next().await {
                monitor.feed_line(&task, &line);
            }
        })
        .await;
        if drained.is_err() {
            debug!(task_id = task.id(), "stdout still open after exit; stopped reading");
        }
    }
    monitor.finish(&task);

    let stderr_text = match stderr_reader.as_mut() {
        Some(handle) => join_stderr(handle, &settings).await,
        None => String::new(),
    };
    let diagnostic = stderr_text.trim();

    let result = classify_exit(&program, &exit, diagnostic, terminate.delivered);
    let final_text = if diagnostic.is_empty() {
        monitor.text().to_string()
    } else {
        diagnostic.to_string()
    };

    task.finish(result, Some(Progress::new(PROGRESS_MAX, final_text)));
}

/// Map an exit into the task's terminal outcome.
///
/// A process that received our terminate (or kill) signal ends `Canceled`
/// whatever its exit looks like.
pub fn classify_exit(
    program: &str,
    exit: &ExitReport,
    diagnostic: &str,
    terminated_by_request: bool,
) -> TaskResult {
    if terminated_by_request {
        return Err(TaskError::Canceled);
    }

    let (exit_code, failure) = match exit {
        ExitReport::Exited(0) => return Ok(()),
        ExitReport::Exited(code) => (Some(*code), RunFailure::NonZeroExit),
        ExitReport::Signaled(_) => (None, RunFailure::Crashed),
        ExitReport::WaitFailed(_) => (None, RunFailure::WaitFailed),
    };

    let diagnostic = match exit {
        // The OS message is the real diagnostic here; stderr may be empty or
        // unrelated.
        ExitReport::WaitFailed(msg) => msg.clone(),
        _ if !diagnostic.is_empty() => diagnostic.to_string(),
        other => other.to_string(),
    };

    Err(TaskError::Run(RunException {
        program: program.to_string(),
        exit_code,
        diagnostic,
        failure,
    }))
}

/// Bring the process in line with the handle's cancel / pause requests.
fn reconcile<P: ManagedProcess>(
    process: &mut P,
    task: &TaskReporter,
    terminate: &mut TerminateState,
    settings: &ProcessSettings,
) {
    if task.cancel_requested() {
        if !terminate.requested {
            terminate.requested = true;
            info!(
                task_id = task.id(),
                pid = ?process.pid(),
                "cancel requested; terminating module process"
            );
            match process.terminate() {
                Ok(()) => terminate.delivered = true,
                // Already exiting on its own; its exit decides the outcome.
                Err(e @ SignalError::ProcessGone { .. }) => {
                    log_signal_failure(task, "terminate", &e);
                    return;
                }
                Err(e) => log_signal_failure(task, "terminate", &e),
            }
            terminate.kill_at = settings
                .terminate_grace
                .map(|grace| Instant::now() + grace);
        }
        return;
    }

    if !process.supports_suspension() {
        return;
    }

    let wanted = task.pause_requested();
    if wanted == process.is_paused() {
        return;
    }

    if wanted {
        match process.pause() {
            Ok(()) => {
                task.mark_paused(true);
                info!(task_id = task.id(), pid = ?process.pid(), "module process paused");
            }
            Err(e) => {
                task.rollback_pause(false);
                log_signal_failure(task, "pause", &e);
            }
        }
    } else {
        match process.resume() {
            Ok(()) => {
                task.mark_paused(false);
                info!(task_id = task.id(), pid = ?process.pid(), "module process resumed");
            }
            Err(e) => {
                task.rollback_pause(true);
                log_signal_failure(task, "resume", &e);
            }
        }
    }
}

fn log_signal_failure(task: &TaskReporter, action: &str, err: &SignalError) {
    match err {
        SignalError::ProcessGone { .. } => warn!(
            task_id = task.id(),
            program = %task.program(),
            action,
            error = %err,
            "process already exited; request dropped"
        ),
        SignalError::Unsupported => debug!(
            task_id = task.id(),
            action,
            "signal not supported on this platform"
        ),
        SignalError::Delivery { .. } => error!(
            task_id = task.id(),
            program = %task.program(),
            action,
            error = %err,
            "failed to signal module process; request rolled back"
        ),
    }
}

async fn next_line(reader: &mut Option<LineReader>) -> Option<OutputLine> {
    match reader.as_mut() {
        Some(reader) => reader.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn join_stderr(handle: &mut JoinHandle<String>, settings: &ProcessSettings) -> String {
    match timeout(settings.stdout_drain_timeout, &mut *handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "stderr reader failed");
            String::new()
        }
        Err(_) => {
            debug!("stderr still open after exit; stopped reading");
            handle.abort();
            String::new()
        }
    }
}
