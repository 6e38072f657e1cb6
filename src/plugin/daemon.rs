// src/plugin/daemon.rs

//! Long-running plugin that keeps one background process alive.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::output::OutputSink;
use crate::plugin::LongRunningPlugin;
use crate::task::{BoxFuture, CancelFlag};

const STOP_GRACE: Duration = Duration::from_secs(10);

/// Configuration string accepted by [`DaemonPlugin::start`]: either a JSON
/// object `{"command": "...", "args": [...]}` or a bare command line run
/// through `sh -c`.
#[derive(Debug, Clone, Deserialize)]
struct DaemonConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

impl DaemonConfig {
    fn parse(configuration: &str) -> Result<Self> {
        let trimmed = configuration.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("empty daemon configuration"));
        }
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).context("parsing daemon configuration");
        }
        Ok(Self {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), trimmed.to_string()],
        })
    }
}

/// At most one child process per plugin instance. `is_running` is "child
/// spawned and not yet exited"; `stop` kills it.
#[derive(Debug)]
pub struct DaemonPlugin {
    name: String,
    child: Mutex<Option<Child>>,
}

impl DaemonPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            child: Mutex::new(None),
        }
    }

    fn take_child(&self) -> Result<Option<Child>> {
        let mut guard = self
            .child
            .lock()
            .map_err(|_| anyhow!("daemon '{}' child lock poisoned", self.name))?;
        Ok(guard.take())
    }

    async fn start_inner(
        &self,
        configuration: String,
        orchestration_dir: PathBuf,
        output: Arc<dyn OutputSink>,
    ) -> Result<()> {
        if self.is_running() {
            debug!(plugin = %self.name, "daemon already running; start is a no-op");
            return Ok(());
        }

        let cfg = DaemonConfig::parse(&configuration)?;
        let mut cmd = Command::new(&cfg.command);
        cmd.args(&cfg.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if orchestration_dir.is_dir() {
            cmd.current_dir(&orchestration_dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning daemon '{}'", self.name))?;

        // Keep the pipes drained so the child never blocks on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(plugin = %name, "stdout: {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = Arc::clone(&output);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.append_error(&line);
                    sink.append_error("\n");
                }
            });
        }

        info!(plugin = %self.name, pid = ?child.id(), "daemon started");
        let mut guard = self
            .child
            .lock()
            .map_err(|_| anyhow!("daemon '{}' child lock poisoned", self.name))?;
        *guard = Some(child);
        Ok(())
    }

    async fn stop_inner(&self, cancel: CancelFlag) -> Result<()> {
        let Some(mut child) = self.take_child()? else {
            return Ok(());
        };

        child
            .start_kill()
            .with_context(|| format!("killing daemon '{}'", self.name))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.with_context(|| format!("reaping daemon '{}'", self.name))?;
                info!(plugin = %self.name, ?status, "daemon stopped");
            }
            _ = tokio::time::sleep(STOP_GRACE) => {
                warn!(plugin = %self.name, "daemon did not exit within grace period");
            }
            _ = cancel.wait() => {
                warn!(plugin = %self.name, "stop interrupted by cancellation");
            }
        }
        Ok(())
    }
}

impl LongRunningPlugin for DaemonPlugin {
    fn is_running(&self) -> bool {
        let Ok(mut guard) = self.child.lock() else {
            return false;
        };
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn start(
        &self,
        configuration: String,
        orchestration_dir: PathBuf,
        _cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.start_inner(configuration, orchestration_dir, output))
    }

    fn stop(&self, cancel: CancelFlag) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.stop_inner(cancel))
    }
}
