// src/config/validate.rs

use crate::config::model::{AgentConfig, RawAgentConfig};
use crate::errors::{AgentError, Result};
use crate::platform::PlatformType;

impl TryFrom<RawAgentConfig> for AgentConfig {
    type Error = AgentError;

    fn try_from(raw: RawAgentConfig) -> std::result::Result<Self, Self::Error> {
        validate_agent_section(&raw)?;
        validate_long_running_section(&raw)?;
        let platform = resolve_platform(&raw)?;
        Ok(AgentConfig::new_unchecked(
            raw.agent,
            raw.identity,
            raw.long_running,
            platform,
        ))
    }
}

fn validate_agent_section(cfg: &RawAgentConfig) -> Result<()> {
    if cfg.agent.max_output_length == 0 {
        return Err(AgentError::ConfigError(
            "[agent].max_output_length must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_long_running_section(cfg: &RawAgentConfig) -> Result<()> {
    let lr = &cfg.long_running;

    if lr.start_workers == 0 {
        return Err(AgentError::ConfigError(
            "[long_running].start_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if lr.stop_workers == 0 {
        return Err(AgentError::ConfigError(
            "[long_running].stop_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if lr.liveness_interval_secs == 0 {
        return Err(AgentError::ConfigError(
            "[long_running].liveness_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if lr.hard_stop_timeout_secs > lr.soft_stop_timeout_secs {
        return Err(AgentError::ConfigError(format!(
            "[long_running].hard_stop_timeout_secs ({}) must not exceed soft_stop_timeout_secs ({})",
            lr.hard_stop_timeout_secs, lr.soft_stop_timeout_secs
        )));
    }
    Ok(())
}

fn resolve_platform(cfg: &RawAgentConfig) -> Result<Option<PlatformType>> {
    match cfg.identity.platform.as_deref() {
        None => Ok(None),
        Some(value) => PlatformType::parse(value).map(Some).ok_or_else(|| {
            AgentError::ConfigError(format!(
                "[identity].platform '{value}' is not one of linux, windows, macos"
            ))
        }),
    }
}
