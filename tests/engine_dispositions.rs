// tests/engine_dispositions.rs

mod common;
use crate::common::init_tracing;

use std::sync::Arc;

use docagent::contracts::{PluginResult, ResultStatus};
use docagent::engine::noop_association;
use docagent::engine::noop_reply;
use docagent::platform::PlatformType;
use docagent::plugin::PluginRegistry;
use docagent::task::CancelFlag;
use docagent_test_utils::builders::StepBuilder;
use docagent_test_utils::fakes::{FakeWorkerPlugin, FixedPlatform};
use docagent_test_utils::{engine_on, linux_engine};

#[tokio::test]
async fn legacy_document_fails_unregistered_step_with_its_name() {
    init_tracing();
    let engine = linux_engine(PluginRegistry::new());

    let steps = vec![StepBuilder::new("plugin1", "plugin1").build()];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    let result = &results["plugin1"];
    assert_eq!(result.status, ResultStatus::Failed);
    assert_eq!(result.code, 1);
    assert_eq!(
        result.error.as_deref(),
        Some("Plugin with name plugin1 not found")
    );
}

#[tokio::test]
async fn legacy_document_fails_steps_that_declare_preconditions() {
    init_tracing();
    let fake = Arc::new(FakeWorkerPlugin::succeeding());
    let engine = linux_engine(PluginRegistry::new().with_worker("echo", fake.clone()));

    let steps = vec![
        StepBuilder::new("step1", "echo")
            .precondition("platformType", "Linux")
            .build(),
    ];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    let result = &results["step1"];
    assert_eq!(result.status, ResultStatus::Failed);
    assert!(
        result
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("Preconditions are not supported")
    );
    assert_eq!(fake.calls(), 0, "handler must not run");
}

#[tokio::test]
async fn legacy_document_reports_unsupported_platform_as_failure() {
    init_tracing();
    let fake = Arc::new(FakeWorkerPlugin::succeeding().unsupported_on(PlatformType::Linux));
    let engine = linux_engine(PluginRegistry::new().with_worker("echo", fake.clone()));

    let steps = vec![StepBuilder::new("step1", "echo").build()];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    let result = &results["step1"];
    assert_eq!(result.status, ResultStatus::Failed);
    assert!(
        result
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("is not supported on this platform")
    );
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn precondition_document_skips_unregistered_step() {
    init_tracing();
    let engine = linux_engine(PluginRegistry::new());

    let steps = vec![StepBuilder::new("step1", "missing").preconditions_enabled().build()];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    assert_eq!(results["step1"].status, ResultStatus::Skipped);
    assert_eq!(results["step1"].code, 0);
}

#[tokio::test]
async fn matching_platform_precondition_returns_handler_result_verbatim() {
    init_tracing();
    let mut canned = PluginResult::new(ResultStatus::Success, 0);
    canned.output = "handler output".to_string();
    let fake = Arc::new(FakeWorkerPlugin::returning(canned));
    let engine = linux_engine(PluginRegistry::new().with_worker("echo", fake.clone()));

    // Document says "Linux", the host reports "linux": case-insensitive match.
    let steps = vec![
        StepBuilder::new("step1", "echo")
            .preconditions_enabled()
            .precondition("platformType", "Linux")
            .build(),
    ];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    let result = &results["step1"];
    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.code, 0);
    assert_eq!(result.output, "handler output");
    assert_eq!(fake.invoked_steps(), vec!["step1".to_string()]);
}

#[tokio::test]
async fn lowercase_platform_precondition_matches() {
    init_tracing();
    let fake = Arc::new(FakeWorkerPlugin::succeeding());
    let engine = linux_engine(PluginRegistry::new().with_worker("echo", fake.clone()));

    let steps = vec![
        StepBuilder::new("step1", "echo")
            .preconditions_enabled()
            .precondition("platformType", "linux")
            .build(),
    ];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    assert_eq!(results["step1"].status, ResultStatus::Success);
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn other_platform_precondition_skips_even_when_registered() {
    init_tracing();
    let fake = Arc::new(FakeWorkerPlugin::succeeding());
    let engine = engine_on(
        PluginRegistry::new().with_worker("echo", fake.clone()),
        FixedPlatform::windows(),
    );

    let steps = vec![
        StepBuilder::new("step1", "echo")
            .preconditions_enabled()
            .precondition("platformType", "Linux")
            .build(),
        StepBuilder::new("step2", "missing")
            .preconditions_enabled()
            .precondition("platformType", "Linux")
            .build(),
    ];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    assert_eq!(results["step1"].status, ResultStatus::Skipped);
    assert_eq!(results["step2"].status, ResultStatus::Skipped);
    assert!(results["step1"].output.contains("unsatisfied preconditions"));
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn unknown_precondition_key_fails_naming_the_key() {
    init_tracing();
    let fake = Arc::new(FakeWorkerPlugin::succeeding());
    let engine = linux_engine(PluginRegistry::new().with_worker("echo", fake.clone()));

    let steps = vec![
        StepBuilder::new("step1", "echo")
            .preconditions_enabled()
            .precondition("foo", "bar")
            .build(),
    ];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    let result = &results["step1"];
    assert_eq!(result.status, ResultStatus::Failed);
    assert!(result.error.as_deref().unwrap_or_default().contains("foo"));
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn two_unknown_precondition_keys_are_comma_joined() {
    init_tracing();
    let fake = Arc::new(FakeWorkerPlugin::succeeding());
    let engine = linux_engine(PluginRegistry::new().with_worker("echo", fake.clone()));

    let steps = vec![
        StepBuilder::new("step1", "echo")
            .preconditions_enabled()
            .precondition("foo", "1")
            .precondition("bar", "2")
            .build(),
    ];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    let error = results["step1"].error.clone().unwrap_or_default();
    assert!(error.contains("'bar, foo'"), "unexpected error: {error}");
}

#[tokio::test]
async fn non_matching_platform_wins_over_unknown_keys() {
    init_tracing();
    let fake = Arc::new(FakeWorkerPlugin::succeeding());
    let engine = linux_engine(PluginRegistry::new().with_worker("echo", fake.clone()));

    let steps = vec![
        StepBuilder::new("step1", "echo")
            .preconditions_enabled()
            .precondition("platformType", "Windows")
            .precondition("foo", "bar")
            .build(),
    ];
    let results = engine
        .run_plugins("doc-1", steps, noop_reply(), noop_association(), CancelFlag::new())
        .await;

    assert_eq!(results["step1"].status, ResultStatus::Skipped);
}
