// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running module programs, using
//! `tokio::process::Command`, and reporting back into the task handle.
//!
//! - [`backend`] provides the `ProcessLauncher` / `ManagedProcess` traits the
//!   runner is written against, so tests can swap in scripted processes.
//! - [`controller`] is the real implementation on top of OS processes.
//! - [`signal`] sends stop / continue / terminate signals.
//! - [`output`] consumes stdout (progress) and stderr (diagnostics).
//! - [`task_runner`] drives one task from spawn to terminal outcome.
//! - [`settings`] holds the runner's timing knobs.

pub mod backend;
pub mod controller;
pub mod output;
pub mod settings;
pub mod signal;
pub mod task_runner;

pub use backend::{ExitReport, ManagedProcess, OutputStream, ProcessLauncher};
pub use controller::{OsLauncher, ProcessController};
pub use output::{LineReader, OutputLine, MAX_LINE_BYTES};
pub use settings::ProcessSettings;
pub use signal::SignalError;
pub use task_runner::classify_exit;
