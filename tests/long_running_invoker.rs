// tests/long_running_invoker.rs

mod common;
use crate::common::init_tracing;

use std::sync::Arc;
use std::time::Duration;

use docagent::contracts::{PluginResult, ResultStatus};
use docagent::engine::{StepEngine, noop_association, noop_reply};
use docagent::fs::mock::MockFileSystem;
use docagent::longrunning::{
    EnableCheck, LongRunningCommand, LongRunningInvoker, LongRunningManager, ManagerOptions,
    MemoryPluginStore, PluginInfoStore, StartType,
};
use docagent::plugin::PluginRegistry;
use docagent::task::CancelFlag;
use docagent_test_utils::builders::StepBuilder;
use docagent_test_utils::fakes::FakeLongRunningPlugin;
use docagent_test_utils::linux_engine;
use serde_json::{Value, json};

struct Fixture {
    engine: Arc<StepEngine>,
    manager: Arc<LongRunningManager>,
    store: Arc<MemoryPluginStore>,
    plugin: Arc<FakeLongRunningPlugin>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryPluginStore::new());
    let manager = Arc::new(LongRunningManager::new(
        store.clone(),
        Arc::new(MockFileSystem::new()),
        ManagerOptions {
            orchestration_root: "/orch/lrp".into(),
            ..ManagerOptions::default()
        },
    ));
    let plugin = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("aws:cloudWatch", plugin.clone());

    let invoker = LongRunningInvoker::new(
        "aws:cloudWatch",
        Arc::clone(&manager),
        EnableCheck {
            retries: 2,
            interval: Duration::from_millis(10),
        },
    );
    let engine = linux_engine(
        PluginRegistry::new().with_long_running("aws:cloudWatch", Arc::new(invoker)),
    );

    Fixture {
        engine,
        manager,
        store,
        plugin,
    }
}

async fn invoke(engine: &Arc<StepEngine>, properties: Value) -> PluginResult {
    let step = StepBuilder::new("cw-step", "aws:cloudWatch")
        .properties(properties)
        .build();
    let mut results = engine
        .run_plugins(
            "doc-1",
            vec![step],
            noop_reply(),
            noop_association(),
            CancelFlag::new(),
        )
        .await;
    results.remove("cw-step").expect("result for cw-step")
}

#[tokio::test]
async fn enable_starts_plugin_with_serialized_configuration() {
    init_tracing();
    let f = fixture();

    let result = invoke(
        &f.engine,
        json!({ "startType": "Enabled", "properties": { "interval": 60 } }),
    )
    .await;

    assert_eq!(result.status, ResultStatus::Success, "{result:?}");
    assert_eq!(result.output, "Enabled aws:cloudWatch");
    assert!(f.plugin.is_running_now());
    assert_eq!(f.plugin.last_configuration().as_deref(), Some(r#"{"interval":60}"#));
    assert!(f.manager.running_plugins().await.contains_key("aws:cloudWatch"));
    assert!(f.store.read().unwrap()["aws:cloudWatch"].state.is_enabled);
}

#[tokio::test]
async fn enable_restarts_an_already_running_plugin() {
    init_tracing();
    let f = fixture();
    let enable = json!({ "startType": "Enabled", "properties": "first" });
    assert_eq!(invoke(&f.engine, enable).await.status, ResultStatus::Success);

    let enable = json!({ "startType": "Enabled", "properties": "second" });
    assert_eq!(invoke(&f.engine, enable).await.status, ResultStatus::Success);

    assert_eq!(f.plugin.start_count(), 2);
    assert_eq!(f.plugin.stop_count(), 1);
    assert_eq!(f.plugin.last_configuration().as_deref(), Some("second"));
    assert_eq!(
        f.manager.running_plugins().await["aws:cloudWatch"].configuration,
        "second"
    );
}

#[tokio::test]
async fn disable_stops_and_forgets_the_plugin() {
    init_tracing();
    let f = fixture();
    invoke(&f.engine, json!({ "startType": "Enabled" })).await;

    let result = invoke(&f.engine, json!({ "startType": "Disabled" })).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.output, "Disabled aws:cloudWatch");
    assert!(!f.plugin.is_running_now());
    assert!(f.manager.running_plugins().await.is_empty());
    assert!(f.store.read().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_start_type_fails_with_allowed_values() {
    init_tracing();
    let f = fixture();

    let result = invoke(&f.engine, json!({ "startType": "Sometimes" })).await;

    assert_eq!(result.status, ResultStatus::Failed);
    let error = result.error.unwrap_or_default();
    assert!(
        error.contains("Allowed values of StartType: Enabled | Disabled"),
        "unexpected error: {error}"
    );
    assert_eq!(f.plugin.start_count(), 0);
}

#[tokio::test]
async fn stderr_during_start_fails_and_stops_the_plugin() {
    init_tracing();
    let f = fixture();
    f.plugin.set_stderr_on_start("config file is invalid");

    let result = invoke(&f.engine, json!({ "startType": "Enabled" })).await;

    assert_eq!(result.status, ResultStatus::Failed);
    assert!(result.error.unwrap_or_default().contains("config file is invalid"));
    assert_eq!(f.plugin.stop_count(), 1);
    assert!(!f.plugin.is_running_now());
    assert!(f.manager.running_plugins().await.is_empty());
}

#[tokio::test]
async fn failed_start_is_reported() {
    init_tracing();
    let f = fixture();
    f.plugin.set_fail_start(true);

    let result = invoke(&f.engine, json!({ "startType": "Enabled" })).await;

    assert_eq!(result.status, ResultStatus::Failed);
    assert!(
        result
            .error
            .unwrap_or_default()
            .starts_with("Failed to enable aws:cloudWatch")
    );
}

#[test]
fn command_parsing_accepts_both_key_casings() {
    let lower = LongRunningCommand::from_properties(&json!({
        "startType": "Enabled",
        "properties": { "a": 1 }
    }))
    .unwrap();
    let upper = LongRunningCommand::from_properties(&json!({
        "StartType": "Disabled",
        "Properties": "raw text"
    }))
    .unwrap();

    assert_eq!(lower.start_type(), Ok(StartType::Enabled));
    assert_eq!(lower.configuration(), r#"{"a":1}"#);
    assert_eq!(upper.start_type(), Ok(StartType::Disabled));
    assert_eq!(upper.configuration(), "raw text");
}

#[test]
fn start_type_is_case_sensitive() {
    assert_eq!(StartType::parse("Enabled"), Some(StartType::Enabled));
    assert_eq!(StartType::parse("enabled"), None);
    let command = LongRunningCommand::from_properties(&json!({})).unwrap();
    assert!(command.start_type().is_err());
    assert_eq!(command.configuration(), "");
}
