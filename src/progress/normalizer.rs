// src/progress/normalizer.rs

//! Folds [`ProgressEvent`]s into a single [`Progress`] value.

use tracing::debug;

use super::{
    Progress, ProgressEvent, PROGRESS_MIN, PROGRESS_RUNNING_MAX, PROGRESS_RUNNING_MIN,
};

/// Per-task progress state.
///
/// Owned by the task runner; nothing else mutates it. Observers read the
/// [`Progress`] values it hands out.
#[derive(Debug, Clone)]
pub struct ProgressNormalizer {
    program: String,
    value: u32,
    text: String,
}

impl ProgressNormalizer {
    /// `program` is only used to tag diagnostics.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            value: PROGRESS_MIN,
            text: String::new(),
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn snapshot(&self) -> Progress {
        Progress::new(self.value, self.text.clone())
    }

    /// Reset to the pre-start state.
    pub fn reset(&mut self) {
        self.value = PROGRESS_MIN;
        self.text.clear();
    }

    /// Apply one event.
    ///
    /// Returns the new snapshot if the value or text changed.
    pub fn apply(&mut self, event: ProgressEvent) -> Option<Progress> {
        let before = self.value;
        let text_changed = match event {
            ProgressEvent::Started { name, .. } => {
                self.increment();
                self.set_text(name)
            }
            ProgressEvent::Progress { fraction } => {
                self.value = fraction_to_value(fraction);
                false
            }
            ProgressEvent::Finished { name } => {
                self.increment();
                self.set_text(format!("Finished: {name}"))
            }
            ProgressEvent::Error { message } => {
                debug!(program = %self.program, error = %message, "progress output error");
                false
            }
        };

        if text_changed || before != self.value {
            Some(self.snapshot())
        } else {
            None
        }
    }

    fn increment(&mut self) {
        self.value = (self.value + 1).min(PROGRESS_RUNNING_MAX);
    }

    fn set_text(&mut self, text: String) -> bool {
        if self.text == text {
            return false;
        }
        self.text = text;
        true
    }
}

/// Map a fraction onto the open running interval `1..=999`.
///
/// Rounds half away from zero on the decimal value, so `0.0025` gives 3.
pub fn fraction_to_value(fraction: f64) -> u32 {
    if fraction.is_nan() {
        return PROGRESS_RUNNING_MIN;
    }
    let scaled = per_mille(fraction).round();
    scaled.clamp(PROGRESS_RUNNING_MIN as f64, PROGRESS_RUNNING_MAX as f64) as u32
}

/// `fraction * 1000` without the binary rounding error of a multiply:
/// shift the shortest decimal form by three places and parse it again.
fn per_mille(fraction: f64) -> f64 {
    if !fraction.is_finite() {
        return fraction * 1000.0;
    }
    format!("{fraction}e3")
        .parse()
        .unwrap_or(fraction * 1000.0)
}
