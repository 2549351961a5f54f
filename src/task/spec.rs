// src/task/spec.rs

//! What to run: program, arguments and per-task options.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::hosting::AvailableData;
use crate::progress::Progress;

/// Callback invoked on the worker for every progress change, in order.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Description of one module invocation.
///
/// Identity is the `(program, args)` pair; everything else is optional.
#[derive(Clone)]
pub struct TaskSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub payload: Option<AvailableData>,
    pub on_progress: Option<ProgressCallback>,
}

impl TaskSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: Vec::new(),
            payload: None,
            on_progress: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn payload(mut self, data: AvailableData) -> Self {
        self.payload = Some(data);
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Program and arguments as a single display string.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("env", &self.env)
            .field("payload", &self.payload.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}
