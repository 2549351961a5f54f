// src/engine/mod.rs

//! Execution engine for cmdtask.
//!
//! - [`pool`] is the bounded worker pool that decouples submission from
//!   execution.
//! - [`scheduler`] turns submitted [`TaskSpec`](crate::task::TaskSpec)s into
//!   handles and pool jobs.

pub mod pool;
pub mod scheduler;

pub use pool::{Job, WorkerPool};
pub use scheduler::Scheduler;
