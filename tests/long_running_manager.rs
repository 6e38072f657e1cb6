// tests/long_running_manager.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use docagent::errors::AgentError;
use docagent::fs::mock::MockFileSystem;
use docagent::longrunning::{
    FilePluginStore, LongRunningManager, ManagerOptions, MemoryPluginStore, PluginInfo,
    PluginInfoMap, PluginInfoStore, StopType,
};
use docagent::output::{OutputSink, PluginOutput};
use docagent::task::CancelFlag;
use docagent_test_utils::fakes::FakeLongRunningPlugin;

fn options() -> ManagerOptions {
    ManagerOptions {
        liveness_interval: Duration::from_secs(3600),
        soft_stop_timeout: Duration::from_millis(500),
        hard_stop_timeout: Duration::from_millis(100),
        orchestration_root: PathBuf::from("/orch/lrp"),
        ..ManagerOptions::default()
    }
}

fn manager(store: Arc<dyn PluginInfoStore>, options: ManagerOptions) -> Arc<LongRunningManager> {
    Arc::new(LongRunningManager::new(
        store,
        Arc::new(MockFileSystem::new()),
        options,
    ))
}

fn sink() -> Arc<dyn OutputSink> {
    Arc::new(PluginOutput::new(Arc::new(MockFileSystem::new()), None))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    with_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn start_stop_and_repeated_stop() {
    init_tracing();
    let store = Arc::new(MemoryPluginStore::new());
    let manager = manager(store.clone(), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());

    manager
        .start_plugin("cw", "cfg".into(), "/orch/cw".into(), CancelFlag::new(), sink())
        .await
        .unwrap();

    let running = manager.running_plugins().await;
    assert!(running["cw"].state.is_enabled);
    assert_eq!(running["cw"].configuration, "cfg");
    let persisted = store.read().unwrap();
    assert!(persisted["cw"].state.is_enabled);
    assert!(cw.is_running_now());

    manager.stop_plugin("cw", CancelFlag::new()).await.unwrap();
    assert!(!manager.running_plugins().await.contains_key("cw"));
    assert!(!store.read().unwrap().contains_key("cw"));
    assert_eq!(cw.stop_count(), 1);

    // Second stop is a no-op.
    manager.stop_plugin("cw", CancelFlag::new()).await.unwrap();
    assert_eq!(cw.stop_count(), 1);
}

#[tokio::test]
async fn stop_of_plugin_that_is_not_running_does_not_call_handler() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());

    manager.stop_plugin("cw", CancelFlag::new()).await.unwrap();
    manager.stop_plugin("never-registered", CancelFlag::new()).await.unwrap();
    assert_eq!(cw.stop_count(), 0);
}

#[tokio::test]
async fn start_of_unregistered_plugin_fails_and_leaves_map_alone() {
    init_tracing();
    let store = Arc::new(MemoryPluginStore::new());
    let manager = manager(store.clone(), options());

    let err = manager
        .start_plugin("ghost", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not registered"), "unexpected error: {err}");
    assert!(manager.running_plugins().await.is_empty());
    assert!(store.read().unwrap().is_empty());
}

#[tokio::test]
async fn failed_start_is_surfaced_but_recorded() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    cw.set_fail_start(true);
    manager.ensure_plugin_registered("cw", cw.clone());

    let result = manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await;
    assert!(result.is_err());
    assert!(manager.running_plugins().await.contains_key("cw"));
}

#[tokio::test]
async fn failed_stop_keeps_entry_while_plugin_still_runs() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());
    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();

    cw.set_fail_stop(true);
    assert!(manager.stop_plugin("cw", CancelFlag::new()).await.is_err());
    assert!(manager.running_plugins().await.contains_key("cw"));

    // The process died on its own: the error no longer matters.
    cw.set_running(false);
    manager.stop_plugin("cw", CancelFlag::new()).await.unwrap();
    assert!(!manager.running_plugins().await.contains_key("cw"));
}

#[tokio::test]
async fn ensure_registered_keeps_the_first_handler() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let first = Arc::new(FakeLongRunningPlugin::new());
    let second = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", first.clone());
    manager.ensure_plugin_registered("cw", second.clone());
    assert_eq!(manager.registered_plugins().len(), 1);

    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();
    assert_eq!(first.start_count(), 1);
    assert_eq!(second.start_count(), 0);
}

#[tokio::test]
async fn startup_drops_records_of_unregistered_plugins() {
    init_tracing();
    let mut persisted = PluginInfoMap::new();
    persisted.insert("cw".into(), PluginInfo::enabled("cw", "cfg"));
    let store = Arc::new(MemoryPluginStore::with_plugins(persisted));
    let manager = manager(store.clone(), options());

    manager.module_execute().await.unwrap();

    assert!(manager.running_plugins().await.is_empty());
    assert!(store.read().unwrap().is_empty());
    manager.module_request_stop(StopType::Hard).await;
}

#[tokio::test]
async fn startup_revives_registered_plugins_with_last_configuration() {
    init_tracing();
    let mut persisted = PluginInfoMap::new();
    persisted.insert("cw".into(), PluginInfo::enabled("cw", r#"{"interval":60}"#));
    let store = Arc::new(MemoryPluginStore::with_plugins(persisted));
    let manager = manager(store, options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());

    manager.module_execute().await.unwrap();
    wait_until(|| cw.start_count() == 1).await;

    assert_eq!(cw.last_configuration().as_deref(), Some(r#"{"interval":60}"#));
    assert_eq!(
        cw.last_orchestration_dir(),
        Some(PathBuf::from("/orch/lrp/cw"))
    );
    manager.module_request_stop(StopType::Soft).await;
}

#[tokio::test]
async fn unreadable_state_aborts_manager_startup() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("/state/longrunningplugins/state.json", "{not json");
    let store = Arc::new(FilePluginStore::new(Arc::new(fs), Path::new("/state")));
    let manager = manager(store, options());

    assert!(manager.module_execute().await.is_err());
}

#[tokio::test]
async fn liveness_job_restarts_dead_plugins() {
    init_tracing();
    let manager = manager(
        Arc::new(MemoryPluginStore::new()),
        ManagerOptions {
            liveness_interval: Duration::from_millis(20),
            ..options()
        },
    );
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());

    manager.module_execute().await.unwrap();
    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();
    assert_eq!(cw.start_count(), 1);

    cw.set_running(false);
    wait_until(|| cw.start_count() >= 2).await;
    assert!(cw.is_running_now());
    assert_eq!(cw.last_configuration().as_deref(), Some("cfg"));

    manager.module_request_stop(StopType::Soft).await;
}

#[tokio::test]
async fn soft_stop_stops_plugins_but_keeps_them_recorded() {
    init_tracing();
    let store = Arc::new(MemoryPluginStore::new());
    let manager = manager(store.clone(), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());
    manager.module_execute().await.unwrap();
    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();

    manager.module_request_stop(StopType::Soft).await;

    assert_eq!(cw.stop_count(), 1);
    assert!(!cw.is_running_now());
    assert!(store.read().unwrap().contains_key("cw"));
}

#[tokio::test]
async fn hard_stop_issues_stops_without_waiting() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());
    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();

    manager.module_request_stop(StopType::Hard).await;
    wait_until(|| cw.stop_count() == 1).await;
}

#[tokio::test]
async fn stops_for_one_plugin_are_never_queued_twice() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());
    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();
    cw.set_stop_delay(Duration::from_millis(200));

    let done = manager.submit_stop("cw").unwrap();
    assert!(manager.is_stop_pending("cw"));
    assert!(matches!(
        manager.submit_stop("cw"),
        Err(AgentError::DuplicateJob(name)) if name == "cw"
    ));

    with_timeout(done).await.unwrap();
    wait_until(|| !manager.is_stop_pending("cw")).await;
    assert_eq!(cw.stop_count(), 1);
    // A pool stop does not forget the plugin.
    assert!(manager.running_plugins().await.contains_key("cw"));

    // Once finished, the same name can be stopped again.
    let again = manager.submit_stop("cw").unwrap();
    with_timeout(again).await.unwrap();
    assert_eq!(cw.stop_count(), 2);
}

#[tokio::test]
async fn hard_stop_queues_stops_on_the_stop_pool() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());
    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();
    cw.set_stop_delay(Duration::from_millis(50));

    manager.module_request_stop(StopType::Hard).await;

    // Returned before the slow stop finished; the stop is still in the pool.
    assert!(manager.is_stop_pending("cw"));
    assert_eq!(cw.stop_count(), 0);

    wait_until(|| !manager.is_stop_pending("cw")).await;
    assert_eq!(cw.stop_count(), 1);
    assert!(!cw.is_running_now());
}

#[tokio::test]
async fn soft_stop_waits_for_slow_stops() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    let cw = Arc::new(FakeLongRunningPlugin::new());
    manager.ensure_plugin_registered("cw", cw.clone());
    manager
        .start_plugin("cw", "cfg".into(), "/orch".into(), CancelFlag::new(), sink())
        .await
        .unwrap();
    cw.set_stop_delay(Duration::from_millis(50));

    manager.module_request_stop(StopType::Soft).await;

    assert!(!manager.is_stop_pending("cw"));
    assert_eq!(cw.stop_count(), 1);
}

#[tokio::test]
async fn stop_of_unregistered_plugin_is_not_queued() {
    init_tracing();
    let manager = manager(Arc::new(MemoryPluginStore::new()), options());
    assert!(matches!(
        manager.submit_stop("ghost"),
        Err(AgentError::PluginNotRegistered(_))
    ));
    assert!(!manager.is_stop_pending("ghost"));
}
