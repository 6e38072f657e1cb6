// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Plugin {0} is not registered")]
    PluginNotRegistered(String),

    #[error("Job {0} is already submitted to the pool")]
    DuplicateJob(String),

    #[error("Task pool is shut down")]
    PoolShutDown,

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AgentError>;
