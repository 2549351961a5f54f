// src/task/state.rs

//! Task lifecycle states.

use std::fmt;

/// Lifecycle of a task.
///
/// ```text
/// Pending -> Started -> Running <-> Paused
///                          |           |
///                          v           v
///               Completed | Failed | Canceled
/// ```
///
/// `Started` means "accepted by the scheduler"; the process is spawned on the
/// transition to `Running`. A queued task can still end `Canceled` or
/// `Failed` (spawn error) without ever running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Started,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Paused)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;

        match (self, next) {
            (Pending, Started) => true,
            (Pending, Failed | Canceled) => true,
            (Started, Running | Failed | Canceled) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running | Paused, Completed | Failed | Canceled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Started => "started",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}
