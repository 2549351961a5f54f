// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The task runner talks to a [`ProcessLauncher`] and the [`ManagedProcess`]
//! it returns instead of `tokio::process` directly. Production code uses
//! [`OsLauncher`](super::controller::OsLauncher); tests can provide a launcher
//! whose processes are scripted in memory and record every control call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::task::{SpawnError, TaskSpec};

use super::signal::SignalError;

/// Readable end of a process output pipe.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// Normal exit with a status code.
    Exited(i32),
    /// Killed by a signal (unix) or otherwise ended without a code.
    Signaled(Option<i32>),
    /// The OS could not report the exit.
    WaitFailed(String),
}

impl ExitReport {
    pub fn success(&self) -> bool {
        matches!(self, ExitReport::Exited(0))
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReport::Exited(code) => write!(f, "exited with code {code}"),
            ExitReport::Signaled(Some(sig)) => write!(f, "terminated by signal {sig}"),
            ExitReport::Signaled(None) => write!(f, "terminated without an exit code"),
            ExitReport::WaitFailed(msg) => write!(f, "waiting for process failed: {msg}"),
        }
    }
}

/// Starts processes for tasks.
pub trait ProcessLauncher: Send + Sync + 'static {
    type Process: ManagedProcess;

    /// Spawn the process described by `spec`.
    fn launch(&self, spec: &TaskSpec) -> Result<Self::Process, SpawnError>;

    /// Whether processes from this launcher can be suspended.
    fn supports_suspension(&self) -> bool;
}

/// One live process, exclusively owned by the task runner.
pub trait ManagedProcess: Send + 'static {
    fn pid(&self) -> Option<u32>;

    fn take_stdout(&mut self) -> Option<OutputStream>;

    fn take_stderr(&mut self) -> Option<OutputStream>;

    /// Ask the process to stop. Idempotent.
    fn terminate(&mut self) -> Result<(), SignalError>;

    /// Stop the process forcefully.
    fn kill(&mut self) -> Result<(), SignalError>;

    fn supports_suspension(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Suspend the process. No-op when already paused.
    fn pause(&mut self) -> Result<(), SignalError>;

    /// Continue a suspended process. No-op when not paused.
    fn resume(&mut self) -> Result<(), SignalError>;

    /// Wait until the process exits. Must be cancel safe: the runner polls it
    /// inside `select!` and drops it whenever another branch fires.
    fn wait_for_exit(&mut self) -> Pin<Box<dyn Future<Output = ExitReport> + Send + '_>>;
}
