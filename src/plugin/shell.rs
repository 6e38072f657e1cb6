// src/plugin/shell.rs

//! Worker plugin that runs a list of shell commands.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::contracts::{Configuration, PluginResult, ResultStatus};
use crate::output::OutputSink;
use crate::platform::PlatformType;
use crate::plugin::{ExecutionContext, WorkerPlugin};
use crate::task::{BoxFuture, CancelFlag};

/// Exit codes a script uses to ask for a reboot before continuing.
pub const REBOOT_EXIT_CODES: [i32; 2] = [194, 3010];

const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Which interpreter the commands are fed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Sh,
    PowerShell,
}

/// Step properties understood by [`ShellCommandPlugin`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShellProperties {
    #[serde(alias = "commands")]
    run_command: Vec<String>,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

/// Runs `runCommand` lines through `sh -c` or PowerShell.
///
/// Exit code 0 is `Success`, 194/3010 are `SuccessAndReboot`, anything else
/// is `Failed`. A canceled flag kills the process and reports `Cancelled`;
/// exceeding `timeoutSeconds` reports `TimedOut`.
#[derive(Debug, Clone)]
pub struct ShellCommandPlugin {
    shell: Shell,
}

impl ShellCommandPlugin {
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }

    fn command(&self, script: &str) -> Command {
        match self.shell {
            Shell::Sh => {
                let mut c = Command::new("sh");
                c.arg("-c").arg(script);
                c
            }
            Shell::PowerShell => {
                let mut c = Command::new("powershell");
                c.arg("-NoProfile")
                    .arg("-NonInteractive")
                    .arg("-Command")
                    .arg(script);
                c
            }
        }
    }

    async fn run(
        &self,
        config: &Configuration,
        cancel: &CancelFlag,
        output: &Arc<dyn OutputSink>,
    ) -> Result<PluginResult> {
        let props: ShellProperties = serde_json::from_value(config.properties.clone())
            .with_context(|| format!("invalid properties for step '{}'", config.plugin_id))?;

        let script = props.run_command.join("\n");
        let timeout = Duration::from_secs(props.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS));

        let mut cmd = self.command(&script);
        let working_dir = props
            .working_directory
            .filter(|d| !d.is_empty())
            .or_else(|| Some(config.default_working_directory.clone()).filter(|d| !d.is_empty()));
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(step = %config.plugin_id, lines = props.run_command.len(), "starting shell step");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning shell for step '{}'", config.plugin_id))?;

        let stdout_pump = child
            .stdout
            .take()
            .map(|out| pump_lines(out, Arc::clone(output), false));
        let stderr_pump = child
            .stderr
            .take()
            .map(|err| pump_lines(err, Arc::clone(output), true));

        let mut result = tokio::select! {
            status_res = child.wait() => {
                let status = status_res
                    .with_context(|| format!("waiting for shell of step '{}'", config.plugin_id))?;
                let code = status.code().unwrap_or(-1);
                debug!(step = %config.plugin_id, exit_code = code, "shell exited");
                let status = if code == 0 {
                    ResultStatus::Success
                } else if REBOOT_EXIT_CODES.contains(&code) {
                    ResultStatus::SuccessAndReboot
                } else {
                    ResultStatus::Failed
                };
                PluginResult::new(status, code)
            }
            state = cancel.wait() => {
                info!(step = %config.plugin_id, ?state, "cancellation requested; killing shell");
                if let Err(e) = child.kill().await {
                    warn!(step = %config.plugin_id, error = %e, "failed to kill shell on cancellation");
                }
                PluginResult::new(ResultStatus::Cancelled, 1)
            }
            _ = tokio::time::sleep(timeout) => {
                warn!(step = %config.plugin_id, timeout_secs = timeout.as_secs(), "shell timed out; killing");
                if let Err(e) = child.kill().await {
                    warn!(step = %config.plugin_id, error = %e, "failed to kill shell on timeout");
                }
                PluginResult::new(ResultStatus::TimedOut, 1)
            }
        };

        for pump in [stdout_pump, stderr_pump].into_iter().flatten() {
            let _ = pump.await;
        }

        result.standard_output = output.stdout();
        result.standard_error = output.stderr();
        result.output = result.standard_output.clone();
        if result.status == ResultStatus::Failed {
            result.error = Some(format!("command exited with code {}", result.code));
        }
        Ok(result)
    }
}

fn pump_lines<R>(reader: R, output: Arc<dyn OutputSink>, is_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                output.append_error(&line);
                output.append_error("\n");
            } else {
                output.append_output(&line);
                output.append_output("\n");
            }
        }
    })
}

impl WorkerPlugin for ShellCommandPlugin {
    fn execute(
        &self,
        _ctx: ExecutionContext,
        config: Configuration,
        cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, PluginResult> {
        Box::pin(async move {
            match self.run(&config, &cancel, &output).await {
                Ok(result) => result,
                Err(err) => PluginResult::failed(1, format!("{err:#}")),
            }
        })
    }

    fn is_supported(&self, platform: PlatformType) -> std::result::Result<(), String> {
        match (self.shell, platform) {
            (Shell::PowerShell, PlatformType::Windows) => Ok(()),
            (Shell::Sh, PlatformType::Linux | PlatformType::MacOs) => Ok(()),
            (shell, platform) => Err(format!("{shell:?} scripts are not supported on {platform}")),
        }
    }
}
