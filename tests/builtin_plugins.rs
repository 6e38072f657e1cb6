// tests/builtin_plugins.rs
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use docagent::contracts::{PluginResult, ResultStatus};
use docagent::engine::{StepEngine, noop_association, noop_reply};
use docagent::fs::mock::MockFileSystem;
use docagent::output::{OutputSink, PluginOutput};
use docagent::platform::PlatformType;
use docagent::plugin::daemon::DaemonPlugin;
use docagent::plugin::shell::{Shell, ShellCommandPlugin};
use docagent::plugin::{LongRunningPlugin, PluginRegistry, WorkerPlugin};
use docagent::task::CancelFlag;
use docagent_test_utils::builders::StepBuilder;
use docagent_test_utils::linux_engine;
use serde_json::json;

fn shell_engine() -> Arc<StepEngine> {
    linux_engine(
        PluginRegistry::new()
            .with_worker("aws:runShellScript", Arc::new(ShellCommandPlugin::new(Shell::Sh))),
    )
}

async fn run_script(lines: &[&str], cancel: CancelFlag) -> PluginResult {
    let step = StepBuilder::new("script", "aws:runShellScript")
        .properties(json!({ "runCommand": lines }))
        .build();
    let mut results = shell_engine()
        .run_plugins("doc-1", vec![step], noop_reply(), noop_association(), cancel)
        .await;
    results.remove("script").expect("result for script step")
}

#[tokio::test]
async fn script_output_is_captured() {
    init_tracing();
    let result = run_script(&["echo hello", "echo oops 1>&2"], CancelFlag::new()).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.code, 0);
    assert_eq!(result.standard_output, "hello\n");
    assert_eq!(result.standard_error, "oops\n");
}

#[tokio::test]
async fn exit_codes_map_to_statuses() {
    init_tracing();
    let failed = run_script(&["exit 3"], CancelFlag::new()).await;
    assert_eq!(failed.status, ResultStatus::Failed);
    assert_eq!(failed.code, 3);
    assert_eq!(failed.error.as_deref(), Some("command exited with code 3"));

    let reboot = run_script(&["exit 194"], CancelFlag::new()).await;
    assert_eq!(reboot.status, ResultStatus::SuccessAndReboot);
    assert_eq!(reboot.code, 194);
}

#[tokio::test]
async fn missing_run_command_fails_the_step() {
    init_tracing();
    let step = StepBuilder::new("script", "aws:runShellScript")
        .properties(json!({ "workingDirectory": "/tmp" }))
        .build();
    let mut results = shell_engine()
        .run_plugins("doc-1", vec![step], noop_reply(), noop_association(), CancelFlag::new())
        .await;
    let result = results.remove("script").unwrap();

    assert_eq!(result.status, ResultStatus::Failed);
    assert!(result.error.unwrap_or_default().contains("invalid properties"));
}

#[tokio::test]
async fn cancellation_kills_the_script() {
    init_tracing();
    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = with_timeout(run_script(&["sleep 30"], cancel)).await;
    assert_eq!(result.status, ResultStatus::Cancelled);
}

#[test]
fn shells_declare_their_platforms() {
    let sh = ShellCommandPlugin::new(Shell::Sh);
    let ps = ShellCommandPlugin::new(Shell::PowerShell);
    assert!(sh.is_supported(PlatformType::Linux).is_ok());
    assert!(sh.is_supported(PlatformType::MacOs).is_ok());
    assert!(sh.is_supported(PlatformType::Windows).is_err());
    assert!(ps.is_supported(PlatformType::Windows).is_ok());
    assert!(ps.is_supported(PlatformType::Linux).is_err());
}

#[tokio::test]
async fn daemon_runs_until_stopped() {
    init_tracing();
    let daemon = DaemonPlugin::new("test:daemon");
    let output: Arc<dyn OutputSink> =
        Arc::new(PluginOutput::new(Arc::new(MockFileSystem::new()), None));

    daemon
        .start("sleep 30".into(), "/nonexistent".into(), CancelFlag::new(), Arc::clone(&output))
        .await
        .unwrap();
    assert!(daemon.is_running());

    // A second start leaves the running child alone.
    daemon
        .start("sleep 30".into(), "/nonexistent".into(), CancelFlag::new(), output)
        .await
        .unwrap();

    with_timeout(daemon.stop(CancelFlag::new())).await.unwrap();
    assert!(!daemon.is_running());

    // Stopping again is harmless.
    daemon.stop(CancelFlag::new()).await.unwrap();
}

#[tokio::test]
async fn daemon_reports_exit_and_rejects_empty_configuration() {
    init_tracing();
    let daemon = DaemonPlugin::new("test:daemon");
    let output: Arc<dyn OutputSink> =
        Arc::new(PluginOutput::new(Arc::new(MockFileSystem::new()), None));

    assert!(
        daemon
            .start("  ".into(), "/tmp".into(), CancelFlag::new(), Arc::clone(&output))
            .await
            .is_err()
    );

    daemon
        .start(r#"{"command":"true"}"#.into(), "/tmp".into(), CancelFlag::new(), output)
        .await
        .unwrap();
    with_timeout(async {
        while daemon.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}
