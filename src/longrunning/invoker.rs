// src/longrunning/invoker.rs

//! Worker adapter that turns an enable/disable step into manager calls.
//!
//! A step targeting a long-running category carries a [`LongRunningCommand`]
//! in its properties:
//!
//! ```json
//! { "startType": "Enabled", "properties": { "command": "cw-agent" } }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::contracts::{Configuration, PluginResult};
use crate::longrunning::manager::LongRunningManager;
use crate::output::OutputSink;
use crate::plugin::{ExecutionContext, WorkerPlugin};
use crate::task::{BoxFuture, CancelFlag};

pub const ALLOWED_START_TYPES_MESSAGE: &str = "Allowed values of StartType: Enabled | Disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartType {
    Enabled,
    Disabled,
}

impl StartType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Enabled" => Some(StartType::Enabled),
            "Disabled" => Some(StartType::Disabled),
            _ => None,
        }
    }
}

/// Typed payload of an enable/disable step.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongRunningCommand {
    #[serde(default, alias = "StartType")]
    pub start_type: String,
    /// Plugin configuration; passed to `start` as-is when it is a string,
    /// serialized to JSON otherwise.
    #[serde(default, alias = "Properties")]
    pub properties: Value,
}

impl LongRunningCommand {
    pub fn from_properties(properties: &Value) -> Result<Self, String> {
        LongRunningCommand::deserialize(properties)
            .map_err(|err| format!("invalid long-running plugin properties: {err}"))
    }

    pub fn start_type(&self) -> Result<StartType, String> {
        StartType::parse(&self.start_type).ok_or_else(|| ALLOWED_START_TYPES_MESSAGE.to_string())
    }

    pub fn configuration(&self) -> String {
        match &self.properties {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// How long to wait for a freshly enabled plugin to report itself running.
#[derive(Debug, Clone, Copy)]
pub struct EnableCheck {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for EnableCheck {
    fn default() -> Self {
        Self {
            retries: 3,
            interval: Duration::from_millis(1000),
        }
    }
}

pub struct LongRunningInvoker {
    plugin_name: String,
    manager: Arc<LongRunningManager>,
    check: EnableCheck,
}

impl LongRunningInvoker {
    pub fn new(
        plugin_name: impl Into<String>,
        manager: Arc<LongRunningManager>,
        check: EnableCheck,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            manager,
            check,
        }
    }

    async fn disable(&self, cancel: CancelFlag) -> PluginResult {
        match self.manager.stop_plugin(&self.plugin_name, cancel).await {
            Ok(()) => PluginResult::success(format!("Disabled {}", self.plugin_name)),
            Err(err) => PluginResult::failed(
                1,
                format!("Failed to disable {}: {err}", self.plugin_name),
            ),
        }
    }

    async fn enable(
        &self,
        configuration: String,
        orchestration_dir: PathBuf,
        cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> PluginResult {
        let name = &self.plugin_name;

        if let Err(err) = self.manager.stop_plugin(name, cancel.clone()).await {
            return PluginResult::failed(1, format!("Failed to stop {name} before enabling: {err}"));
        }

        if let Err(err) = self
            .manager
            .start_plugin(name, configuration, orchestration_dir, cancel.clone(), Arc::clone(&output))
            .await
        {
            return PluginResult::failed(1, format!("Failed to enable {name}: {err}"));
        }

        let mut running = self.manager.is_plugin_running(name);
        for attempt in 0..self.check.retries {
            if running || cancel.state().is_set() {
                break;
            }
            tokio::time::sleep(self.check.interval).await;
            running = self.manager.is_plugin_running(name);
            info!(plugin = %name, attempt, running, "waiting for plugin to report running");
        }

        let stderr = output.stderr();
        if !stderr.trim().is_empty() {
            warn!(plugin = %name, "plugin wrote to stderr while starting; stopping it again");
            if let Err(err) = self.manager.stop_plugin(name, cancel).await {
                warn!(plugin = %name, error = %err, "failed to stop plugin after start error");
            }
            return PluginResult::failed(1, format!("Failed to enable {name}: {}", stderr.trim()));
        }

        if !running {
            return PluginResult::failed(1, format!("{name} did not report running after start"));
        }

        PluginResult::success(format!("Enabled {name}"))
    }
}

impl WorkerPlugin for LongRunningInvoker {
    fn execute(
        &self,
        _ctx: ExecutionContext,
        config: Configuration,
        cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, PluginResult> {
        Box::pin(async move {
            let command = match LongRunningCommand::from_properties(&config.properties) {
                Ok(command) => command,
                Err(err) => return PluginResult::failed(1, err),
            };
            let start_type = match command.start_type() {
                Ok(start_type) => start_type,
                Err(err) => return PluginResult::failed(1, err),
            };

            info!(plugin = %self.plugin_name, ?start_type, "long-running plugin invocation");

            match start_type {
                StartType::Disabled => self.disable(cancel).await,
                StartType::Enabled => {
                    let dir = if config.orchestration_directory.is_empty() {
                        self.manager.plugin_output_dir(&self.plugin_name)
                    } else {
                        PathBuf::from(&config.orchestration_directory)
                    };
                    self.enable(command.configuration(), dir, cancel, output).await
                }
            }
        })
    }
}
