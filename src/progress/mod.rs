// src/progress/mod.rs

//! Progress reporting for running modules.
//!
//! - [`xml`] turns raw stdout text into discrete [`ProgressEvent`]s.
//! - [`normalizer`] folds those events into a [`Progress`] value on the
//!   fixed `0..=1000` scale.
//!
//! The two endpoints of the scale are sentinels: `0` means the process has
//! not started yet and `1000` means the task reached a terminal state after
//! running. Everything a running module reports lands in `1..=999`.

pub mod normalizer;
pub mod xml;

pub use normalizer::ProgressNormalizer;
pub use xml::XmlProgressParser;

/// Value reported before the process starts.
pub const PROGRESS_MIN: u32 = 0;
/// Value reserved for terminal completion.
pub const PROGRESS_MAX: u32 = 1000;
/// Highest value a running module can reach.
pub const PROGRESS_RUNNING_MAX: u32 = PROGRESS_MAX - 1;
/// Lowest value a running module can report through a fraction.
pub const PROGRESS_RUNNING_MIN: u32 = PROGRESS_MIN + 1;

/// A single event reported by a running module on stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A filter started. The comment is informational only.
    Started { name: String, comment: String },
    /// Overall progress as a fraction, nominally in `0.0..=1.0`.
    Progress { fraction: f64 },
    /// A filter finished.
    Finished { name: String },
    /// The output could not be understood.
    Error { message: String },
}

/// Snapshot of a task's normalized progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub value: u32,
    pub text: String,
}

impl Progress {
    pub fn new(value: u32, text: impl Into<String>) -> Self {
        Self {
            value: value.min(PROGRESS_MAX),
            text: text.into(),
        }
    }

    /// Progress as a percentage, for display.
    pub fn percent(&self) -> f32 {
        self.value as f32 / 10.0
    }

    pub fn is_complete(&self) -> bool {
        self.value == PROGRESS_MAX
    }
}
