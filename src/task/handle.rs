// src/task/handle.rs

//! Caller-facing task handle and the worker-side reporter.
//!
//! A [`TaskHandle`] and its `TaskReporter` share one `TaskShared`. The
//! reporter is owned by the worker running the task and is the only writer
//! of state, progress and outcome. Handles only read those and set the
//! cancel / pause request flags, waking the worker through a [`Notify`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::hosting::AvailableData;
use crate::progress::Progress;

use super::error::{ControlError, TaskError};
use super::spec::TaskSpec;
use super::state::TaskState;

/// Terminal outcome of a task.
pub type TaskResult = Result<(), TaskError>;

/// Unique id assigned by the scheduler.
pub type TaskId = u64;

struct TaskShared {
    id: TaskId,
    spec: TaskSpec,
    can_pause: bool,
    state: watch::Sender<TaskState>,
    progress: watch::Sender<Progress>,
    outcome: watch::Sender<Option<TaskResult>>,
    cancel_requested: AtomicBool,
    pause_requested: AtomicBool,
    control: Notify,
}

impl TaskShared {
    fn current_state(&self) -> TaskState {
        *self.state.borrow()
    }

    fn wake_worker(&self) {
        self.control.notify_one();
    }
}

/// Handle to a submitted task.
///
/// Cheap to clone; all clones observe the same task. Any number of clones
/// may wait on [`TaskHandle::result`] concurrently and all receive the same
/// outcome.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    /// Create a handle in the `Pending` state together with its reporter.
    pub(crate) fn new(id: TaskId, spec: TaskSpec, can_pause: bool) -> (TaskHandle, TaskReporter) {
        let shared = Arc::new(TaskShared {
            id,
            spec,
            can_pause,
            state: watch::Sender::new(TaskState::Pending),
            progress: watch::Sender::new(Progress::default()),
            outcome: watch::Sender::new(None),
            cancel_requested: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
            control: Notify::new(),
        });

        (
            TaskHandle {
                shared: Arc::clone(&shared),
            },
            TaskReporter { shared },
        )
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn program(&self) -> &str {
        &self.shared.spec.program
    }

    pub fn args(&self) -> &[String] {
        &self.shared.spec.args
    }

    /// Opaque hosting payload the task was submitted with.
    pub fn payload(&self) -> Option<&AvailableData> {
        self.shared.spec.payload.as_ref()
    }

    /// Whether pause/resume can have any effect on this platform.
    pub fn can_pause(&self) -> bool {
        self.shared.can_pause
    }

    pub fn state(&self) -> TaskState {
        self.shared.current_state()
    }

    /// Receiver that is notified on every lifecycle transition.
    pub fn state_changes(&self) -> watch::Receiver<TaskState> {
        self.shared.state.subscribe()
    }

    /// Current normalized progress.
    pub fn progress(&self) -> Progress {
        self.shared.progress.borrow().clone()
    }

    /// Receiver that is notified whenever progress changes.
    ///
    /// Intermediate values can be skipped by a slow reader; use
    /// [`TaskSpec::on_progress`] to see every value.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.shared.progress.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn is_pause_requested(&self) -> bool {
        self.shared.pause_requested.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    ///
    /// A task that has not started yet will never spawn its process. A running
    /// task gets a single termination request. No-op once finished or when a
    /// cancellation is already pending.
    pub fn cancel(&self) {
        if self.is_finished() {
            return;
        }
        if self.shared.cancel_requested.swap(true, Ordering::SeqCst) {
            debug!(task_id = self.id(), "cancel already requested");
            return;
        }
        info!(task_id = self.id(), program = %self.program(), "cancel requested");
        self.shared.wake_worker();
    }

    /// Request suspension of the process.
    ///
    /// Requests made before the process runs are replayed once it does.
    pub fn pause(&self) -> Result<(), ControlError> {
        self.set_paused(true)
    }

    /// Request the process to continue after [`TaskHandle::pause`].
    pub fn resume(&self) -> Result<(), ControlError> {
        self.set_paused(false)
    }

    fn set_paused(&self, paused: bool) -> Result<(), ControlError> {
        if !self.shared.can_pause {
            return Err(ControlError::Unsupported);
        }
        if self.is_finished() {
            return Err(ControlError::Finished);
        }
        if self.shared.pause_requested.swap(paused, Ordering::SeqCst) != paused {
            debug!(task_id = self.id(), paused, "pause request changed");
            self.shared.wake_worker();
        }
        Ok(())
    }

    /// Wait for the terminal outcome.
    pub async fn result(&self) -> TaskResult {
        let mut rx = self.shared.outcome.subscribe();
        let outcome = rx.wait_for(Option::is_some).await.map(|o| o.clone());
        match outcome {
            Ok(Some(result)) => result,
            // The sender lives as long as `self`, so this is unreachable in
            // practice.
            _ => Err(TaskError::SchedulerClosed),
        }
    }

    /// Second writer for paths that must finish a task the worker will never
    /// see, e.g. a rejected submission.
    pub(crate) fn reporter(&self) -> TaskReporter {
        TaskReporter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Terminal outcome if the task has already finished.
    pub fn try_result(&self) -> Option<TaskResult> {
        self.shared.outcome.borrow().clone()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.shared.id)
            .field("program", &self.shared.spec.program)
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

/// Worker-side writer for a task.
pub(crate) struct TaskReporter {
    shared: Arc<TaskShared>,
}

impl TaskReporter {
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.shared.spec
    }

    pub fn program(&self) -> &str {
        &self.shared.spec.program
    }

    pub fn state(&self) -> TaskState {
        self.shared.current_state()
    }

    pub fn cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn pause_requested(&self) -> bool {
        self.shared.pause_requested.load(Ordering::SeqCst)
    }

    /// Undo a pause/resume request the process could not honour.
    pub fn rollback_pause(&self, paused: bool) {
        self.shared.pause_requested.store(paused, Ordering::SeqCst);
    }

    /// Resolves when a handle changed a request flag.
    pub async fn control_changed(&self) {
        self.shared.control.notified().await;
    }

    /// Accepted by the scheduler.
    pub fn mark_started(&self) -> bool {
        self.transition(TaskState::Started)
    }

    /// The process is up. Progress restarts from zero.
    pub fn mark_running(&self) -> bool {
        self.publish_progress(Progress::default());
        self.transition(TaskState::Running)
    }

    pub fn mark_paused(&self, paused: bool) -> bool {
        let next = if paused {
            TaskState::Paused
        } else {
            TaskState::Running
        };
        self.transition(next)
    }

    pub fn publish_progress(&self, progress: Progress) {
        let changed = self.shared.progress.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress.clone();
                true
            }
        });
        if changed {
            if let Some(callback) = &self.shared.spec.on_progress {
                callback(&progress);
            }
        }
    }

    /// Record the terminal outcome.
    ///
    /// Only the first call has any effect. `final_progress` is published after
    /// the state turns terminal and before waiters are released.
    pub fn finish(&self, result: TaskResult, final_progress: Option<Progress>) -> bool {
        let next = match &result {
            Ok(()) => TaskState::Completed,
            Err(TaskError::Canceled) => TaskState::Canceled,
            Err(_) => TaskState::Failed,
        };

        if !self.transition(next) {
            debug!(task_id = self.id(), "task already finished; ignoring outcome");
            return false;
        }

        if let Some(progress) = final_progress {
            self.publish_progress(progress);
        }
        self.shared.outcome.send_replace(Some(result));
        true
    }

    fn transition(&self, next: TaskState) -> bool {
        let mut from = None;
        let moved = self.shared.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        if moved {
            debug!(task_id = self.id(), from = ?from, to = %next, "task state changed");
        }
        moved
    }
}

impl Drop for TaskReporter {
    fn drop(&mut self) {
        // A runner that panicked or a job dropped with its queue must not
        // leave waiters hanging.
        if !self.state().is_terminal() && Arc::strong_count(&self.shared) > 1 {
            warn!(task_id = self.id(), "task dropped without an outcome");
            self.finish(Err(TaskError::Aborted), None);
        }
    }
}
