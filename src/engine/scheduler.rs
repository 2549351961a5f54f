// src/engine/scheduler.rs

//! Task submission front-end.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ConfigFile;
use crate::exec::task_runner::run_task;
use crate::exec::{OsLauncher, ProcessLauncher, ProcessSettings};
use crate::task::{TaskError, TaskHandle, TaskSpec};

use super::pool::WorkerPool;

/// Accepts tasks and runs them on a [`WorkerPool`].
///
/// Generic over the [`ProcessLauncher`] so tests can run the real task
/// runner against scripted processes.
pub struct Scheduler<L: ProcessLauncher = OsLauncher> {
    pool: WorkerPool,
    launcher: Arc<L>,
    settings: ProcessSettings,
    next_id: AtomicU64,
}

impl Scheduler<OsLauncher> {
    pub fn new(pool: WorkerPool, settings: ProcessSettings) -> Self {
        Self::with_launcher(pool, OsLauncher, settings)
    }

    /// Build the pool and settings described by a validated config.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(WorkerPool::new(cfg.workers()), cfg.process_settings())
    }
}

impl<L: ProcessLauncher> Scheduler<L> {
    pub fn with_launcher(pool: WorkerPool, launcher: L, settings: ProcessSettings) -> Self {
        Self {
            pool,
            launcher: Arc::new(launcher),
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn settings(&self) -> &ProcessSettings {
        &self.settings
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Submit a task.
    ///
    /// The task is `Started` on return and runs as soon as a worker is free.
    /// If the scheduler is shut down the handle is already `Failed` with
    /// [`TaskError::SchedulerClosed`].
    pub fn submit(&self, spec: TaskSpec) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (handle, reporter) = TaskHandle::new(id, spec, self.launcher.supports_suspension());

        debug!(
            task_id = id,
            command = %reporter.spec().command_line(),
            "task submitted"
        );
        reporter.mark_started();

        let launcher = Arc::clone(&self.launcher);
        let settings = self.settings;
        let job = Box::pin(async move {
            run_task(launcher.as_ref(), reporter, settings).await;
        });

        if let Err(rejected) = self.pool.execute(job) {
            warn!(task_id = id, "scheduler is shut down; rejecting task");
            handle
                .reporter()
                .finish(Err(TaskError::SchedulerClosed), None);
            drop(rejected);
        }

        handle
    }

    /// Submit `program` with `args` and default options.
    pub fn submit_command<I, S>(&self, program: impl Into<String>, args: I) -> TaskHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(TaskSpec::new(program, args))
    }

    /// Stop accepting tasks and wait for queued and running ones to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

impl<L: ProcessLauncher> fmt::Debug for Scheduler<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
