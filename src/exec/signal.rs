// src/exec/signal.rs

//! OS signal delivery for pause / resume / terminate.

use thiserror::Error;

/// Failure to deliver a control signal.
///
/// Never terminal for a task: the runner rolls back the request and logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("process suspension is not supported on this platform")]
    Unsupported,

    #[error("process {pid} no longer exists")]
    ProcessGone { pid: u32 },

    #[error("failed to deliver {signal} to process {pid}: {reason}")]
    Delivery {
        pid: u32,
        signal: &'static str,
        reason: String,
    },
}

/// Signals the runner sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Stop,
    Continue,
    Terminate,
}

impl ControlSignal {
    pub fn name(self) -> &'static str {
        match self {
            ControlSignal::Stop => "SIGSTOP",
            ControlSignal::Continue => "SIGCONT",
            ControlSignal::Terminate => "SIGTERM",
        }
    }
}

/// Whether this platform can suspend processes with signals.
pub const fn suspension_supported() -> bool {
    cfg!(unix)
}

#[cfg(unix)]
pub fn send(pid: u32, signal: ControlSignal) -> Result<(), SignalError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = match signal {
        ControlSignal::Stop => Signal::SIGSTOP,
        ControlSignal::Continue => Signal::SIGCONT,
        ControlSignal::Terminate => Signal::SIGTERM,
    };

    let target = i32::try_from(pid).map_err(|_| SignalError::Delivery {
        pid,
        signal: signal.name(),
        reason: "pid out of range".to_string(),
    })?;

    match kill(Pid::from_raw(target), raw) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(SignalError::ProcessGone { pid }),
        Err(errno) => Err(SignalError::Delivery {
            pid,
            signal: signal.name(),
            reason: errno.desc().to_string(),
        }),
    }
}

#[cfg(not(unix))]
pub fn send(_pid: u32, _signal: ControlSignal) -> Result<(), SignalError> {
    Err(SignalError::Unsupported)
}
