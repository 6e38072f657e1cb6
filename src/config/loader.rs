// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{AgentConfig, RawAgentConfig};
use crate::errors::Result;

/// Load `Agent.toml` from `path` without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawAgentConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawAgentConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load and validate the agent configuration.
///
/// Defaults come from `serde` + `Default`; validation checks worker counts,
/// the liveness interval, the stop timeouts and the platform override.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let raw_config = load_from_path(&path)?;
    let config = AgentConfig::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = ?path, "no agent config file; using defaults");
        return AgentConfig::try_from(RawAgentConfig::default());
    }
    load_and_validate(path)
}

/// `Agent.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Agent.toml")
}
