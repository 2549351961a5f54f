// src/logging.rs

//! Log output for `cmdtask`.
//!
//! The filter is chosen in this order:
//! 1. `--log-level` on the command line, applied to every target;
//! 2. `CMDTASK_LOG`, either a bare level or full `EnvFilter` directives such
//!    as `"info,cmdtask::exec=debug"`;
//! 3. `info`.
//!
//! Everything goes to stderr. Stdout is reserved for progress lines.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "CMDTASK_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(Level::from(level).as_str()),
        None => filter_from_env(),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn filter_from_env() -> EnvFilter {
    let Ok(raw) = std::env::var(LOG_ENV) else {
        return EnvFilter::new("info");
    };

    if let Some(level) = parse_level_str(&raw) {
        return EnvFilter::new(level.as_str());
    }
    EnvFilter::try_new(raw.trim()).unwrap_or_else(|e| {
        eprintln!("cmdtask: ignoring invalid {LOG_ENV} ({e}); using info");
        EnvFilter::new("info")
    })
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Parse a bare level name; `"warning"` is accepted for `warn`.
pub fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(Level::WARN),
        other => other.parse().ok(),
    }
}
