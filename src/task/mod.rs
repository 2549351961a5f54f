// src/task/mod.rs

//! Tasks: what the caller submits and what it gets back.
//!
//! - [`spec`] describes a module invocation.
//! - [`handle`] is the future/promise pair shared between caller and worker.
//! - [`state`] holds the lifecycle state machine.
//! - [`error`] holds the terminal outcomes and control errors.

pub mod error;
pub mod handle;
pub mod spec;
pub mod state;

pub use error::{ControlError, RunException, RunFailure, SpawnError, TaskError};
pub use handle::{TaskHandle, TaskId, TaskResult};
pub(crate) use handle::TaskReporter;
pub use spec::{ProgressCallback, TaskSpec};
pub use state::TaskState;
