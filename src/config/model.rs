// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::longrunning::{EnableCheck, ManagerOptions};
use crate::platform::PlatformType;

/// Agent configuration as read from `Agent.toml`, before validation.
///
/// ```toml
/// [agent]
/// state_dir = "/var/lib/docagent"
/// orchestration_dir = "/var/lib/docagent/orchestration"
/// max_output_length = 2500
///
/// [identity]
/// instance_id = "i-0123456789abcdef0"
/// platform = "linux"
///
/// [long_running]
/// liveness_interval_secs = 300
/// start_workers = 5
/// stop_workers = 5
/// soft_stop_timeout_secs = 20
/// hard_stop_timeout_secs = 4
/// enable_check_retries = 3
/// enable_check_interval_ms = 1000
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAgentConfig {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub identity: IdentitySection,

    #[serde(default)]
    pub long_running: LongRunningSection,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawAgentConfig>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent: AgentSection,
    pub identity: IdentitySection,
    pub long_running: LongRunningSection,
    platform: Option<PlatformType>,
}

impl AgentConfig {
    pub(crate) fn new_unchecked(
        agent: AgentSection,
        identity: IdentitySection,
        long_running: LongRunningSection,
        platform: Option<PlatformType>,
    ) -> Self {
        Self {
            agent,
            identity,
            long_running,
            platform,
        }
    }

    /// Platform override from `[identity].platform`, if any.
    pub fn platform_override(&self) -> Option<PlatformType> {
        self.platform
    }

    pub fn manager_options(&self) -> ManagerOptions {
        let lr = &self.long_running;
        ManagerOptions {
            liveness_interval: Duration::from_secs(lr.liveness_interval_secs),
            start_workers: lr.start_workers,
            stop_workers: lr.stop_workers,
            soft_stop_timeout: Duration::from_secs(lr.soft_stop_timeout_secs),
            hard_stop_timeout: Duration::from_secs(lr.hard_stop_timeout_secs),
            orchestration_root: self.agent.orchestration_dir.join("longrunningplugins"),
        }
    }

    pub fn enable_check(&self) -> EnableCheck {
        EnableCheck {
            retries: self.long_running.enable_check_retries,
            interval: Duration::from_millis(self.long_running.enable_check_interval_ms),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new_unchecked(
            AgentSection::default(),
            IdentitySection::default(),
            LongRunningSection::default(),
            None,
        )
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Holds `longrunningplugins/state.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Root for per-step stdout/stderr files.
    #[serde(default = "default_orchestration_dir")]
    pub orchestration_dir: PathBuf,

    /// Bound for stdout/stderr/output in step results.
    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/docagent")
}

fn default_orchestration_dir() -> PathBuf {
    PathBuf::from("/var/lib/docagent/orchestration")
}

fn default_max_output_length() -> usize {
    2500
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            orchestration_dir: default_orchestration_dir(),
            max_output_length: default_max_output_length(),
        }
    }
}

/// `[identity]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentitySection {
    /// Falls back to the host name when absent.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// `"linux"`, `"windows"` or `"macos"`; detected when absent.
    #[serde(default)]
    pub platform: Option<String>,
}

/// `[long_running]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LongRunningSection {
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,

    #[serde(default = "default_workers")]
    pub start_workers: usize,

    #[serde(default = "default_workers")]
    pub stop_workers: usize,

    #[serde(default = "default_soft_stop_timeout_secs")]
    pub soft_stop_timeout_secs: u64,

    #[serde(default = "default_hard_stop_timeout_secs")]
    pub hard_stop_timeout_secs: u64,

    /// How often to re-check `is_running` after an enable step.
    #[serde(default = "default_enable_check_retries")]
    pub enable_check_retries: u32,

    #[serde(default = "default_enable_check_interval_ms")]
    pub enable_check_interval_ms: u64,
}

fn default_liveness_interval_secs() -> u64 {
    300
}

fn default_workers() -> usize {
    5
}

fn default_soft_stop_timeout_secs() -> u64 {
    20
}

fn default_hard_stop_timeout_secs() -> u64 {
    4
}

fn default_enable_check_retries() -> u32 {
    3
}

fn default_enable_check_interval_ms() -> u64 {
    1000
}

impl Default for LongRunningSection {
    fn default() -> Self {
        Self {
            liveness_interval_secs: default_liveness_interval_secs(),
            start_workers: default_workers(),
            stop_workers: default_workers(),
            soft_stop_timeout_secs: default_soft_stop_timeout_secs(),
            hard_stop_timeout_secs: default_hard_stop_timeout_secs(),
            enable_check_retries: default_enable_check_retries(),
            enable_check_interval_ms: default_enable_check_interval_ms(),
        }
    }
}
