// src/longrunning/store.rs

//! Durable record of which long-running plugins are running.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{AgentError, Result};
use crate::fs::FileSystem;

/// Relative path (from the agent state dir) of the running-plugins file.
pub const PLUGIN_STATE_FILE_PATH: &str = "longrunningplugins/state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRunState {
    pub last_configuration_modified_time: DateTime<Utc>,
    pub is_enabled: bool,
}

/// Persisted record for one long-running plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    /// Opaque configuration the plugin was last started with.
    pub configuration: String,
    pub state: PluginRunState,
}

impl PluginInfo {
    pub fn enabled(name: impl Into<String>, configuration: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configuration: configuration.into(),
            state: PluginRunState {
                last_configuration_modified_time: Utc::now(),
                is_enabled: true,
            },
        }
    }
}

pub type PluginInfoMap = HashMap<String, PluginInfo>;

/// Storage for the running-plugins map.
pub trait PluginInfoStore: Send + Sync {
    fn read(&self) -> Result<PluginInfoMap>;
    fn write(&self, plugins: &PluginInfoMap) -> Result<()>;
}

/// Stores the map as JSON at `<state_dir>/longrunningplugins/state.json`.
#[derive(Debug)]
pub struct FilePluginStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl FilePluginStore {
    pub fn new(fs: Arc<dyn FileSystem>, state_dir: &Path) -> Self {
        Self {
            fs,
            path: state_dir.join(PLUGIN_STATE_FILE_PATH),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PluginInfoStore for FilePluginStore {
    fn read(&self) -> Result<PluginInfoMap> {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no long-running plugin state file; starting empty");
            return Ok(PluginInfoMap::new());
        }
        let contents = self
            .fs
            .read_to_string(&self.path)
            .map_err(|e| AgentError::Persistence(format!("{e:#}")))?;
        if contents.trim().is_empty() {
            return Ok(PluginInfoMap::new());
        }
        let plugins: PluginInfoMap = serde_json::from_str(&contents)?;
        Ok(plugins)
    }

    fn write(&self, plugins: &PluginInfoMap) -> Result<()> {
        let json = serde_json::to_vec_pretty(plugins)?;
        self.fs
            .write_atomic(&self.path, &json)
            .map_err(|e| AgentError::Persistence(format!("{e:#}")))?;
        info!(path = ?self.path, plugins = plugins.len(), "stored long-running plugin state");
        Ok(())
    }
}

/// Keeps the map in memory only.
#[derive(Debug, Default)]
pub struct MemoryPluginStore {
    plugins: Mutex<PluginInfoMap>,
}

impl MemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugins(plugins: PluginInfoMap) -> Self {
        Self {
            plugins: Mutex::new(plugins),
        }
    }
}

impl PluginInfoStore for MemoryPluginStore {
    fn read(&self) -> Result<PluginInfoMap> {
        self.plugins
            .lock()
            .map(|p| p.clone())
            .map_err(|_| AgentError::LockPoisoned("memory plugin store"))
    }

    fn write(&self, plugins: &PluginInfoMap) -> Result<()> {
        let mut guard = self
            .plugins
            .lock()
            .map_err(|_| AgentError::LockPoisoned("memory plugin store"))?;
        *guard = plugins.clone();
        Ok(())
    }
}
