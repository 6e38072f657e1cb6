// src/platform.rs

//! Host platform and identity.
//!
//! The engine evaluates `platformType` preconditions against
//! [`PlatformProvider::platform_type`]; stores use the instance id to build
//! paths. Tests swap in a fixed provider.

use std::fmt::Debug;

use sysinfo::System;

/// Platform family as used by `platformType` preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformType {
    Linux,
    Windows,
    MacOs,
}

impl PlatformType {
    /// Family of the platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            PlatformType::Windows
        } else if cfg!(target_os = "macos") {
            PlatformType::MacOs
        } else {
            PlatformType::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformType::Linux => "Linux",
            PlatformType::Windows => "Windows",
            PlatformType::MacOs => "MacOS",
        }
    }

    /// Case-insensitive parse of a platform family name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "linux" => Some(PlatformType::Linux),
            "windows" => Some(PlatformType::Windows),
            "macos" | "darwin" => Some(PlatformType::MacOs),
            _ => None,
        }
    }

    /// Whether a precondition value names this platform (case-insensitive).
    pub fn matches(self, value: &str) -> bool {
        value.trim().eq_ignore_ascii_case(self.as_str())
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of platform and instance identity.
pub trait PlatformProvider: Send + Sync + Debug {
    fn platform_type(&self) -> PlatformType;
    fn platform_name(&self) -> String;
    fn platform_version(&self) -> String;
    fn instance_id(&self) -> String;

    /// Instance id without the `i-` style prefix, used in path segments.
    fn short_instance_id(&self) -> String {
        let id = self.instance_id();
        match id.split_once('-') {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => id,
        }
    }
}

/// Provider backed by the host name and OS release, plus optional overrides
/// from the agent config.
#[derive(Debug, Clone)]
pub struct HostPlatform {
    platform: PlatformType,
    instance_id: String,
}

impl HostPlatform {
    /// A blank configured instance id falls back to the host name.
    pub fn new(platform_override: Option<PlatformType>, instance_id: Option<String>) -> Self {
        let instance_id = instance_id
            .filter(|id| !id.trim().is_empty())
            .or_else(host_name)
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            platform: platform_override.unwrap_or_else(PlatformType::current),
            instance_id,
        }
    }
}

fn host_name() -> Option<String> {
    let name = gethostname::gethostname().to_string_lossy().trim().to_string();
    (!name.is_empty()).then_some(name)
}

impl PlatformProvider for HostPlatform {
    fn platform_type(&self) -> PlatformType {
        self.platform
    }

    fn platform_name(&self) -> String {
        System::name().unwrap_or_else(|| std::env::consts::OS.to_string())
    }

    fn platform_version(&self) -> String {
        System::os_version()
            .or_else(System::long_os_version)
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn instance_id(&self) -> String {
        self.instance_id.clone()
    }
}
