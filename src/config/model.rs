// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::engine::WorkerPool;
use crate::exec::ProcessSettings;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [pool]
/// workers = 4
///
/// [process]
/// pause_poll_interval = "500ms"
/// terminate_grace = "10s"
/// stdout_drain_timeout = "1s"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub process: ProcessSection,
}

/// `[pool]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolSection {
    /// Number of workers; defaults to the host's available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
}

/// `[process]` section. Durations use the `"250ms"` / `"3s"` / `"1m"` form.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSection {
    /// How often requested and actual pause state are reconciled.
    #[serde(default = "default_pause_poll_interval")]
    pub pause_poll_interval: String,

    /// Wait between SIGTERM and a forced kill on cancel. `"0s"` disables the
    /// escalation.
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace: String,

    /// How long output is still read after the process exited.
    #[serde(default = "default_stdout_drain_timeout")]
    pub stdout_drain_timeout: String,
}

fn default_pause_poll_interval() -> String {
    "500ms".to_string()
}

fn default_terminate_grace() -> String {
    "10s".to_string()
}

fn default_stdout_drain_timeout() -> String {
    "1s".to_string()
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            pause_poll_interval: default_pause_poll_interval(),
            terminate_grace: default_terminate_grace(),
            stdout_drain_timeout: default_stdout_drain_timeout(),
        }
    }
}

/// Validated configuration.
///
/// Built from a [`RawConfigFile`] through `TryFrom`, which parses and checks
/// every value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    workers: usize,
    settings: ProcessSettings,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(workers: usize, settings: ProcessSettings) -> Self {
        Self { workers, settings }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn process_settings(&self) -> ProcessSettings {
        self.settings
    }

    pub fn pause_poll_interval(&self) -> Duration {
        self.settings.pause_poll_interval
    }

    /// Override the worker count (e.g. from the command line).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(WorkerPool::default_size(), ProcessSettings::default())
    }
}
