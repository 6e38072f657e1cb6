// src/lib.rs

pub mod cli;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod longrunning;
pub mod output;
pub mod platform;
pub mod plugin;
pub mod task;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::cli::{CliArgs, Command, RunArgs};
use crate::config::{AgentConfig, load_or_default};
use crate::contracts::DocumentState;
use crate::engine::StepEngine;
use crate::exec::{
    AssociationReporter, DocumentProgress, DocumentStore, Executor, FileDocumentStore,
    LoggingAssociationReporter,
};
use crate::fs::{FileSystem, RealFileSystem};
use crate::longrunning::{
    FilePluginStore, LongRunningInvoker, LongRunningManager, PluginInfoStore, StopType,
};
use crate::platform::{HostPlatform, PlatformProvider};
use crate::plugin::{LongRunningPlugin, PluginRegistry, RegistryCell, WorkerPlugin, builtin};
use crate::task::CancelFlag;

/// Composition root: owns the registry, the long-running manager and the
/// collaborators every document run shares.
///
/// The registry is built on first use; plugins added with
/// [`with_worker_plugin`](Self::with_worker_plugin) /
/// [`with_long_running_plugin`](Self::with_long_running_plugin) after that are
/// ignored.
pub struct Agent {
    config: AgentConfig,
    fs: Arc<dyn FileSystem>,
    platform: Arc<dyn PlatformProvider>,
    manager: Arc<LongRunningManager>,
    reporter: Arc<dyn AssociationReporter>,
    workers: Vec<(String, Arc<dyn WorkerPlugin>)>,
    long_running: Vec<(String, Arc<dyn LongRunningPlugin>)>,
    registry: RegistryCell,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Must be called inside a Tokio runtime (the manager starts its pools).
    pub fn new(
        config: AgentConfig,
        fs: Arc<dyn FileSystem>,
        platform: Arc<dyn PlatformProvider>,
        plugin_store: Arc<dyn PluginInfoStore>,
    ) -> Self {
        let manager = Arc::new(LongRunningManager::new(
            plugin_store,
            Arc::clone(&fs),
            config.manager_options(),
        ));

        let workers = builtin::worker_plugins()
            .into_iter()
            .map(|(name, handler)| (name.to_string(), handler))
            .collect();
        let long_running = builtin::long_running_plugins()
            .into_iter()
            .map(|(name, handler)| (name.to_string(), handler))
            .collect();

        Self {
            config,
            fs,
            platform,
            manager,
            reporter: Arc::new(LoggingAssociationReporter),
            workers,
            long_running,
            registry: RegistryCell::new(),
        }
    }

    /// Agent on the real file system and host identity.
    pub fn from_config(config: AgentConfig) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let platform: Arc<dyn PlatformProvider> = Arc::new(HostPlatform::new(
            config.platform_override(),
            config.identity.instance_id.clone(),
        ));
        let store: Arc<dyn PluginInfoStore> =
            Arc::new(FilePluginStore::new(Arc::clone(&fs), &config.agent.state_dir));
        Self::new(config, fs, platform, store)
    }

    pub fn with_worker_plugin(mut self, name: impl Into<String>, handler: Arc<dyn WorkerPlugin>) -> Self {
        self.workers.push((name.into(), handler));
        self
    }

    pub fn with_long_running_plugin(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn LongRunningPlugin>,
    ) -> Self {
        self.long_running.push((name.into(), handler));
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn AssociationReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    pub fn manager(&self) -> &Arc<LongRunningManager> {
        &self.manager
    }

    /// The process registry, built on first call.
    ///
    /// Long-running plugins are registered with the manager and fronted in
    /// the registry by a [`LongRunningInvoker`].
    pub fn registry(&self) -> Arc<PluginRegistry> {
        self.registry.get_or_init(|| {
            let mut registry = PluginRegistry::new();
            for (name, handler) in &self.workers {
                registry.register_worker(name.clone(), Arc::clone(handler));
            }
            for (name, handler) in &self.long_running {
                self.manager.ensure_plugin_registered(name, Arc::clone(handler));
                let adapter = LongRunningInvoker::new(
                    name.clone(),
                    Arc::clone(&self.manager),
                    self.config.enable_check(),
                );
                registry.register_long_running(name.clone(), Arc::new(adapter));
            }
            registry
        })
    }

    pub fn engine(&self) -> Arc<StepEngine> {
        Arc::new(StepEngine::new(
            self.registry(),
            Arc::clone(&self.platform),
            Arc::clone(&self.fs),
            Some(self.config.agent.orchestration_dir.clone()),
            self.config.agent.max_output_length,
        ))
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.engine(), Arc::clone(&self.reporter))
    }

    /// Start the long-running manager. A failure leaves the manager stopped
    /// but is not fatal to the agent.
    pub async fn start(&self) {
        // Registering with the manager happens while the registry is built.
        let _ = self.registry();
        if let Err(err) = self.manager.module_execute().await {
            error!(error = %err, "long-running plugin manager did not start");
        }
    }

    pub async fn stop(&self, stop_type: StopType) {
        self.manager.module_request_stop(stop_type).await;
    }
}

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config = load_or_default(&args.config)?;
    debug!(?config, "agent config loaded");

    match args.command {
        Command::Run(run_args) => run_document(config, run_args).await,
        Command::Plugins => {
            let agent = Agent::from_config(config);
            print_plugins(&agent.registry());
            Ok(())
        }
    }
}

async fn run_document(config: AgentConfig, args: RunArgs) -> Result<()> {
    let agent = Agent::from_config(config);
    let store: Arc<dyn DocumentStore> =
        Arc::new(FileDocumentStore::new(agent.fs(), args.document.clone()));

    if args.dry_run {
        let state = store.load()?;
        print_dry_run(&agent, &state);
        return Ok(());
    }

    agent.start().await;

    // Ctrl-C → cancel the document.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling document");
            cancel.cancel();
        });
    }

    let mut progress = agent.executor().run(cancel, store);
    while let Some(event) = progress.recv().await {
        print_progress(&event)?;
    }

    agent.stop(StopType::Soft).await;
    Ok(())
}

fn print_progress(event: &DocumentProgress) -> Result<()> {
    match event {
        DocumentProgress::StepCompleted { step_id, report } => {
            let status = report
                .plugin_results
                .get(step_id)
                .map(|r| r.status.to_string())
                .unwrap_or_default();
            println!("step {step_id}: {status} (document {})", report.status);
        }
        DocumentProgress::DocumentFinished(report) => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

fn print_plugins(registry: &PluginRegistry) {
    println!("worker plugins:");
    for name in registry.worker_names() {
        println!("  - {name}");
    }
    println!("long-running plugins:");
    for name in registry.long_running_names() {
        println!("  - {name}");
    }
}

/// Print each step's disposition without running anything.
fn print_dry_run(agent: &Agent, state: &DocumentState) {
    let engine = agent.engine();
    let info = &state.document_information;
    println!("docagent dry-run");
    println!("  document = {} ({})", info.document_id, info.document_name);
    println!("  run_count = {}", info.run_count);
    println!();

    println!("steps ({}):", state.step_count());
    for step in &state.instance_plugins_information {
        let disposition = engine.resolve(step);
        println!("  - {} [{}]", step.id, step.name);
        println!("      status: {}", step.result.status);
        println!("      disposition: {}", disposition.label());
        if let Some(result) = disposition.to_result() {
            if let Some(error) = result.error {
                println!("      reason: {error}");
            } else {
                println!("      reason: {}", result.output);
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
