// src/plugin/builtin.rs

//! Platform-conditional registration lists for the built-in plugins.

use std::sync::Arc;

use crate::plugin::daemon::DaemonPlugin;
use crate::plugin::shell::{Shell, ShellCommandPlugin};
use crate::plugin::{LongRunningPlugin, WorkerPlugin};

pub const RUN_SHELL_SCRIPT: &str = "aws:runShellScript";
pub const RUN_POWERSHELL_SCRIPT: &str = "aws:runPowerShellScript";
pub const CLOUDWATCH: &str = "aws:cloudWatch";

/// Worker plugins available on the platform this binary targets.
pub fn worker_plugins() -> Vec<(&'static str, Arc<dyn WorkerPlugin>)> {
    let mut plugins: Vec<(&'static str, Arc<dyn WorkerPlugin>)> = Vec::new();
    if cfg!(windows) {
        plugins.push((
            RUN_POWERSHELL_SCRIPT,
            Arc::new(ShellCommandPlugin::new(Shell::PowerShell)),
        ));
    } else {
        plugins.push((RUN_SHELL_SCRIPT, Arc::new(ShellCommandPlugin::new(Shell::Sh))));
    }
    plugins
}

/// Long-running plugin categories available on this platform.
pub fn long_running_plugins() -> Vec<(&'static str, Arc<dyn LongRunningPlugin>)> {
    vec![(CLOUDWATCH, Arc::new(DaemonPlugin::new(CLOUDWATCH)))]
}
