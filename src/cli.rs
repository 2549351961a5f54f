// src/cli.rs

//! Command line of the `cmdtask` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `cmdtask`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cmdtask",
    version,
    about = "Run a command-line module and report its XML progress output.",
    long_about = None
)]
pub struct CliArgs {
    /// TOML config file.
    ///
    /// Default: `Cmdtask.toml` in the current working directory if it exists,
    /// otherwise built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of pool workers (overrides `[pool].workers`).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Log verbosity for every target. Overrides `CMDTASK_LOG`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Hosting payload (TOML) to attach to the task.
    #[arg(long, value_name = "PATH")]
    pub payload: Option<PathBuf>,

    /// Resolve config and print the command, but don't run it.
    #[arg(long)]
    pub dry_run: bool,

    /// Don't print progress lines; only the exit status reports the outcome.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Module executable to run.
    #[arg(value_name = "PROGRAM")]
    pub program: String,

    /// Arguments passed to the module unchanged.
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

/// Values accepted by `--log-level`.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse `std::env::args`, exiting with usage on error.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
