// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::engine::WorkerPool;
use crate::errors::{CmdTaskError, Result};
use crate::exec::ProcessSettings;
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CmdTaskError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let workers = validate_workers(&raw)?;
        let settings = validate_process_section(&raw)?;
        Ok(ConfigFile::new_unchecked(workers, settings))
    }
}

/// Validate a raw config without keeping the result.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ConfigFile::try_from(cfg.clone()).map(|_| ())
}

fn validate_workers(cfg: &RawConfigFile) -> Result<usize> {
    match cfg.pool.workers {
        Some(0) => Err(CmdTaskError::ConfigError(
            "[pool].workers must be >= 1 (got 0)".to_string(),
        )),
        Some(n) => Ok(n),
        None => Ok(WorkerPool::default_size()),
    }
}

fn validate_process_section(cfg: &RawConfigFile) -> Result<ProcessSettings> {
    let section = &cfg.process;

    let pause_poll_interval = parse_field("pause_poll_interval", &section.pause_poll_interval)?;
    if pause_poll_interval.is_zero() {
        return Err(CmdTaskError::ConfigError(
            "[process].pause_poll_interval must be greater than zero".to_string(),
        ));
    }

    let terminate_grace = parse_field("terminate_grace", &section.terminate_grace)?;
    let stdout_drain_timeout = parse_field("stdout_drain_timeout", &section.stdout_drain_timeout)?;

    Ok(ProcessSettings {
        pause_poll_interval,
        terminate_grace: (!terminate_grace.is_zero()).then_some(terminate_grace),
        stdout_drain_timeout,
    })
}

fn parse_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| {
        CmdTaskError::ConfigError(format!("[process].{field}: {e}"))
    })
}
