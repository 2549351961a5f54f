// src/task/error.rs

//! Terminal task errors and control-request errors.

use std::fmt;
use std::io;

use thiserror::Error;

/// The program could not be started at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to start '{program}': {message}")]
pub struct SpawnError {
    pub program: String,
    pub kind: io::ErrorKind,
    pub message: String,
}

impl SpawnError {
    pub fn from_io(program: impl Into<String>, err: &io::Error) -> Self {
        Self {
            program: program.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// How a started process failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFailure {
    /// The process exited on its own with a non-zero code.
    NonZeroExit,
    /// The process was terminated by a signal it did not handle.
    Crashed,
    /// Waiting for the process failed at the OS level.
    WaitFailed,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunFailure::NonZeroExit => "non-zero exit",
            RunFailure::Crashed => "crashed",
            RunFailure::WaitFailed => "wait failed",
        };
        f.write_str(s)
    }
}

/// A started process did not finish successfully.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("module '{program}' failed ({failure}, exit code {}): {diagnostic}", display_code(.exit_code))]
pub struct RunException {
    pub program: String,
    /// `None` when the process did not exit normally.
    pub exit_code: Option<i32>,
    /// Captured stderr, or a description of the failure when stderr was empty.
    pub diagnostic: String,
    pub failure: RunFailure,
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none".to_string(),
    }
}

/// Terminal failure of a task, as seen through
/// [`TaskHandle::result`](crate::task::TaskHandle::result).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Run(#[from] RunException),

    #[error("task was canceled")]
    Canceled,

    #[error("scheduler is shut down; task was not run")]
    SchedulerClosed,

    #[error("task runner stopped before reporting an outcome")]
    Aborted,
}

/// A pause or resume request was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("process suspension is not supported on this platform")]
    Unsupported,

    #[error("task already finished")]
    Finished,
}
