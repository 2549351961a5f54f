#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cmdtask::config::{ConfigFile, PoolSection, ProcessSection, RawConfigFile};
use cmdtask::exec::ProcessSettings;
use cmdtask::progress::Progress;
use cmdtask::task::TaskSpec;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                pool: PoolSection::default(),
                process: ProcessSection::default(),
            },
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.pool.workers = Some(workers);
        self
    }

    pub fn pause_poll_interval(mut self, value: &str) -> Self {
        self.config.process.pause_poll_interval = value.to_string();
        self
    }

    pub fn terminate_grace(mut self, value: &str) -> Self {
        self.config.process.terminate_grace = value.to_string();
        self
    }

    pub fn stdout_drain_timeout(mut self, value: &str) -> Self {
        self.config.process.stdout_drain_timeout = value.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings with short intervals so tests don't wait on defaults.
pub fn fast_settings() -> ProcessSettings {
    ProcessSettings {
        pause_poll_interval: Duration::from_millis(20),
        terminate_grace: Some(Duration::from_secs(2)),
        stdout_drain_timeout: Duration::from_millis(500),
    }
}

/// `sh -c <script>`.
pub fn sh(script: &str) -> TaskSpec {
    TaskSpec::new("sh", ["-c", script])
}

/// Records every progress value a task reports, in order.
#[derive(Clone, Default)]
pub struct ProgressLog {
    values: Arc<Mutex<Vec<Progress>>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install this log as the `TaskSpec`'s `on_progress` callback.
    pub fn attach(&self, spec: TaskSpec) -> TaskSpec {
        let values = Arc::clone(&self.values);
        spec.on_progress(move |p| values.lock().unwrap().push(p.clone()))
    }

    pub fn all(&self) -> Vec<Progress> {
        self.values.lock().unwrap().clone()
    }

    pub fn values(&self) -> Vec<u32> {
        self.values.lock().unwrap().iter().map(|p| p.value).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.values
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.text.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().unwrap().is_empty()
    }
}
