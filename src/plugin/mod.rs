// src/plugin/mod.rs

//! Step handler contracts.
//!
//! Two handler shapes exist:
//! - [`WorkerPlugin`]: runs once per step and returns a [`PluginResult`].
//! - [`LongRunningPlugin`]: a daemon with its own start/stop lifecycle, owned
//!   by the long-running plugin manager. Each long-running category is fronted
//!   in the [`PluginRegistry`] by a worker adapter that forwards to the
//!   manager, so the engine only ever deals with workers.
//!
//! The engine never knows the concrete plugin type.

use std::path::PathBuf;
use std::sync::Arc;

use crate::contracts::{Configuration, PluginResult, PluginResults, PluginState};
use crate::fs::FileSystem;
use crate::output::OutputSink;
use crate::platform::{PlatformProvider, PlatformType};
use crate::task::{BoxFuture, CancelFlag};

pub mod builtin;
pub mod daemon;
pub mod registry;
pub mod shell;

pub use registry::{PluginRegistry, RegistryCell};

/// Everything a worker handler may need besides its own configuration.
#[derive(Clone)]
pub struct ExecutionContext {
    pub document_id: String,
    pub platform: Arc<dyn PlatformProvider>,
    pub fs: Arc<dyn FileSystem>,
    /// Runs nested step lists through the same engine.
    pub runner: PluginRunner,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("document_id", &self.document_id)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

/// Short-lived step handler.
pub trait WorkerPlugin: Send + Sync {
    /// Run the step. Failures are reported through the returned result, not
    /// by panicking; a panic is still contained by the engine.
    fn execute(
        &self,
        ctx: ExecutionContext,
        config: Configuration,
        cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, PluginResult>;

    /// Whether this handler can run on `platform`; `Err` carries a detail
    /// message for the step result.
    fn is_supported(&self, _platform: PlatformType) -> Result<(), String> {
        Ok(())
    }
}

/// Daemon-like handler managed by the long-running plugin manager.
pub trait LongRunningPlugin: Send + Sync {
    fn is_running(&self) -> bool;

    fn start(
        &self,
        configuration: String,
        orchestration_dir: PathBuf,
        cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> BoxFuture<'_, anyhow::Result<()>>;

    fn stop(&self, cancel: CancelFlag) -> BoxFuture<'_, anyhow::Result<()>>;
}

type RunFn =
    dyn Fn(String, Vec<PluginState>, CancelFlag) -> BoxFuture<'static, PluginResults> + Send + Sync;

/// Callback handed to handlers that run other steps (e.g. a step that
/// executes a sub-document).
#[derive(Clone)]
pub struct PluginRunner {
    run: Arc<RunFn>,
}

impl PluginRunner {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(String, Vec<PluginState>, CancelFlag) -> BoxFuture<'static, PluginResults>
            + Send
            + Sync
            + 'static,
    {
        Self { run: Arc::new(run) }
    }

    /// Runner that executes nothing and returns no results.
    pub fn noop() -> Self {
        Self::new(|_, _, _| Box::pin(async { PluginResults::new() }))
    }

    pub async fn run(
        &self,
        document_id: impl Into<String>,
        steps: Vec<PluginState>,
        cancel: CancelFlag,
    ) -> PluginResults {
        (self.run)(document_id.into(), steps, cancel).await
    }
}

impl std::fmt::Debug for PluginRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PluginRunner")
    }
}
