pub mod builders;
pub mod fakes;

use std::sync::{Arc, Once};

use docagent::engine::StepEngine;
use docagent::fs::mock::MockFileSystem;
use docagent::plugin::PluginRegistry;
use tracing_subscriber::{EnvFilter, fmt};

use crate::fakes::FixedPlatform;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Engine over `registry` on a Linux host, an in-memory file system and no
/// orchestration directory.
pub fn linux_engine(registry: PluginRegistry) -> Arc<StepEngine> {
    engine_on(registry, FixedPlatform::linux())
}

pub fn engine_on(registry: PluginRegistry, platform: FixedPlatform) -> Arc<StepEngine> {
    Arc::new(StepEngine::new(
        Arc::new(registry),
        Arc::new(platform),
        Arc::new(MockFileSystem::new()),
        None,
        2500,
    ))
}
