// src/exec/settings.rs

use std::time::Duration;

/// Default interval for reconciling requested and observed pause state.
pub const DEFAULT_PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default wait after SIGTERM before the process is killed.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(10);
/// Default time to keep reading stdout after the process exited.
pub const DEFAULT_STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Knobs for how the runner drives a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSettings {
    /// How often the runner re-checks pause/resume requests even without a
    /// wake-up. Upper bound on how long a missed request stays unapplied.
    pub pause_poll_interval: Duration,
    /// After a cancel, how long to wait before escalating to a kill.
    /// `None` waits forever.
    pub terminate_grace: Option<Duration>,
    /// How long to keep reading output after exit. Bounds the wait when a
    /// grandchild keeps the pipe open.
    pub stdout_drain_timeout: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            pause_poll_interval: DEFAULT_PAUSE_POLL_INTERVAL,
            terminate_grace: Some(DEFAULT_TERMINATE_GRACE),
            stdout_drain_timeout: DEFAULT_STDOUT_DRAIN_TIMEOUT,
        }
    }
}
