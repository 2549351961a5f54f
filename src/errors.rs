// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Task outcomes have their own error types in [`crate::task`]; this module
//! covers configuration and setup failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CmdTaskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CmdTaskError>;
