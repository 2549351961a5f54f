// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod hosting;
pub mod logging;
pub mod progress;
pub mod task;
pub mod types;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_or_default, ConfigFile};
use crate::engine::Scheduler;
use crate::hosting::AvailableData;
use crate::task::{TaskError, TaskSpec};

/// Exit status used when the task was canceled (Ctrl-C).
pub const EXIT_CANCELED: i32 = 130;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - worker pool / scheduler
/// - progress printing
/// - Ctrl-C handling
///
/// Returns the process exit status.
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut cfg = load_or_default(args.config.as_deref()).context("loading configuration")?;
    if let Some(workers) = args.workers {
        cfg = cfg.with_workers(workers);
    }

    let payload = match &args.payload {
        Some(path) => Some(load_payload(path)?),
        None => None,
    };

    if args.dry_run {
        print_dry_run(&cfg, &args, payload.as_ref());
        return Ok(0);
    }

    let scheduler = Scheduler::from_config(&cfg);

    let mut spec = TaskSpec::new(args.program.clone(), args.args.clone());
    if !args.quiet {
        spec = spec.on_progress(|p| println!("[{:5.1}%] {}", p.percent(), p.text));
    }
    if let Some(data) = payload {
        spec = spec.payload(data);
    }

    let handle = scheduler.submit(spec);
    info!(task_id = handle.id(), program = %handle.program(), "task submitted");

    // Ctrl-C → cancel the task; the runner terminates the process.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            handle.cancel();
        });
    }

    let result = handle.result().await;
    scheduler.shutdown().await;

    let status = match result {
        Ok(()) => {
            info!(task_id = handle.id(), "task completed");
            0
        }
        Err(TaskError::Canceled) => {
            info!(task_id = handle.id(), "task canceled");
            EXIT_CANCELED
        }
        Err(err) => {
            eprintln!("cmdtask: {err}");
            1
        }
    };

    debug!(status, "run finished");
    Ok(status)
}

/// Read a hosting payload from a TOML file.
pub fn load_payload(path: &Path) -> Result<AvailableData> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading payload file {:?}", path))?;
    toml::from_str(&contents).with_context(|| format!("parsing payload TOML from {:?}", path))
}

/// Simple dry-run output: print settings and the command line.
fn print_dry_run(cfg: &ConfigFile, args: &CliArgs, payload: Option<&AvailableData>) {
    let settings = cfg.process_settings();

    println!("cmdtask dry-run");
    println!("  pool.workers = {}", cfg.workers());
    println!(
        "  process.pause_poll_interval = {:?}",
        settings.pause_poll_interval
    );
    match settings.terminate_grace {
        Some(grace) => println!("  process.terminate_grace = {grace:?}"),
        None => println!("  process.terminate_grace = disabled"),
    }
    println!(
        "  process.stdout_drain_timeout = {:?}",
        settings.stdout_drain_timeout
    );
    println!();
    println!("command: {}", TaskSpec::new(args.program.clone(), args.args.clone()).command_line());
    if let Some(data) = payload {
        println!(
            "payload: {} patient(s), {} object descriptor(s)",
            data.patients.len(),
            data.object_descriptors.len()
        );
    }

    debug!("dry-run complete (no execution)");
}
