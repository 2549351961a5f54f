// src/exec/controller.rs

//! Real process controller built on `tokio::process`.

use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::task::{SpawnError, TaskSpec};

use super::backend::{ExitReport, ManagedProcess, OutputStream, ProcessLauncher};
use super::signal::{self, ControlSignal, SignalError};

/// Launcher used in production: spawns OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    type Process = ProcessController;

    fn launch(&self, spec: &TaskSpec) -> Result<ProcessController, SpawnError> {
        ProcessController::start(spec)
    }

    fn supports_suspension(&self) -> bool {
        signal::suspension_supported()
    }
}

/// Owns one child process for the lifetime of a task.
#[derive(Debug)]
pub struct ProcessController {
    program: String,
    child: Child,
    pid: Option<u32>,
    paused: bool,
    terminate_sent: bool,
    exited: bool,
}

impl ProcessController {
    /// Spawn `spec.program` with stdout and stderr piped.
    pub fn start(spec: &TaskSpec) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(spec.program.clone(), &e))?;
        let pid = child.id();

        info!(program = %spec.program, pid = ?pid, "module process started");

        Ok(Self {
            program: spec.program.clone(),
            child,
            pid,
            paused: false,
            terminate_sent: false,
            exited: false,
        })
    }

    fn live_pid(&self) -> Result<u32, SignalError> {
        match self.pid {
            Some(pid) if !self.exited => Ok(pid),
            pid => Err(SignalError::ProcessGone {
                pid: pid.unwrap_or_default(),
            }),
        }
    }
}

impl ManagedProcess for ProcessController {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as OutputStream)
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as OutputStream)
    }

    fn terminate(&mut self) -> Result<(), SignalError> {
        if self.exited {
            return Err(SignalError::ProcessGone {
                pid: self.pid.unwrap_or_default(),
            });
        }
        if self.terminate_sent {
            return Ok(());
        }

        if signal::suspension_supported() {
            let pid = self.live_pid()?;
            signal::send(pid, ControlSignal::Terminate)?;
            // A stopped process only acts on SIGTERM once continued.
            if self.paused {
                signal::send(pid, ControlSignal::Continue)?;
                self.paused = false;
            }
        } else {
            self.child.start_kill().map_err(|e| SignalError::Delivery {
                pid: self.pid.unwrap_or_default(),
                signal: ControlSignal::Terminate.name(),
                reason: e.to_string(),
            })?;
        }

        self.terminate_sent = true;
        debug!(program = %self.program, pid = ?self.pid, "termination requested");
        Ok(())
    }

    fn kill(&mut self) -> Result<(), SignalError> {
        if self.exited {
            return Ok(());
        }
        self.child.start_kill().map_err(|e| SignalError::Delivery {
            pid: self.pid.unwrap_or_default(),
            signal: "SIGKILL",
            reason: e.to_string(),
        })
    }

    fn supports_suspension(&self) -> bool {
        signal::suspension_supported()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self) -> Result<(), SignalError> {
        if !signal::suspension_supported() {
            return Err(SignalError::Unsupported);
        }
        if self.paused {
            return Ok(());
        }
        let pid = self.live_pid()?;
        signal::send(pid, ControlSignal::Stop)?;
        self.paused = true;
        debug!(program = %self.program, pid, "process paused");
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SignalError> {
        if !self.paused {
            return Ok(());
        }
        let pid = self.live_pid()?;
        signal::send(pid, ControlSignal::Continue)?;
        self.paused = false;
        debug!(program = %self.program, pid, "process resumed");
        Ok(())
    }

    fn wait_for_exit(&mut self) -> Pin<Box<dyn Future<Output = ExitReport> + Send + '_>> {
        Box::pin(async move {
            let report = match self.child.wait().await {
                Ok(status) => exit_report(status),
                Err(e) => ExitReport::WaitFailed(e.to_string()),
            };
            self.exited = true;
            self.paused = false;
            report
        })
    }
}

fn exit_report(status: ExitStatus) -> ExitReport {
    if let Some(code) = status.code() {
        return ExitReport::Exited(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ExitReport::Signaled(status.signal())
    }

    #[cfg(not(unix))]
    {
        ExitReport::Signaled(None)
    }
}
