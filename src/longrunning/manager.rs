// src/longrunning/manager.rs

//! Long-running plugin manager.
//!
//! Per plugin name: `Unregistered -> Registered -> Running -> Stopped`, with
//! `Running` entries recorded in a running-plugins map that is persisted on
//! every start/stop. On startup the map is read back and every entry whose
//! plugin is still registered is started again. A periodic liveness job
//! restarts recorded plugins that are no longer running.
//!
//! All access to the running-plugins map goes through one `RwLock`; start and
//! stop hold the write lock across the handler call so that "check
//! membership, then mutate" stays atomic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::errors::{AgentError, Result};
use crate::fs::FileSystem;
use crate::longrunning::store::{PluginInfo, PluginInfoMap, PluginInfoStore};
use crate::output::{OutputSink, PluginOutput};
use crate::plugin::LongRunningPlugin;
use crate::task::{BoxFuture, CancelFlag, ScheduledJob, TaskPool, every};

/// How the manager is being asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopType {
    /// Drain pools with the long timeout and wait for every plugin to stop.
    Soft,
    /// Drain pools with the short timeout and fire plugin stops without
    /// waiting.
    Hard,
}

/// Tunables, usually taken from `[long_running]` in the agent config.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub liveness_interval: Duration,
    pub start_workers: usize,
    pub stop_workers: usize,
    pub soft_stop_timeout: Duration,
    pub hard_stop_timeout: Duration,
    /// Root under which each plugin gets `<root>/<name>` for its output.
    pub orchestration_root: PathBuf,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_secs(300),
            start_workers: 5,
            stop_workers: 5,
            soft_stop_timeout: Duration::from_secs(20),
            hard_stop_timeout: Duration::from_secs(4),
            orchestration_root: PathBuf::from("longrunningplugins"),
        }
    }
}

pub type RegisteredPlugins = HashMap<String, Arc<dyn LongRunningPlugin>>;

pub struct LongRunningManager {
    registered: RwLock<RegisteredPlugins>,
    running: tokio::sync::RwLock<PluginInfoMap>,
    store: Arc<dyn PluginInfoStore>,
    fs: Arc<dyn FileSystem>,
    start_pool: Arc<TaskPool>,
    stop_pool: Arc<TaskPool>,
    liveness: Mutex<Option<ScheduledJob>>,
    options: ManagerOptions,
}

impl std::fmt::Debug for LongRunningManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongRunningManager")
            .field("registered", &self.registered_names())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LongRunningManager {
    /// Must be called inside a Tokio runtime: the worker pools spawn their
    /// workers immediately.
    pub fn new(
        store: Arc<dyn PluginInfoStore>,
        fs: Arc<dyn FileSystem>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            registered: RwLock::new(HashMap::new()),
            running: tokio::sync::RwLock::new(PluginInfoMap::new()),
            store,
            fs,
            start_pool: Arc::new(TaskPool::new("lrpm-start", options.start_workers)),
            stop_pool: Arc::new(TaskPool::new("lrpm-stop", options.stop_workers)),
            liveness: Mutex::new(None),
            options,
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Add `handler` under `name` unless something is registered already.
    pub fn ensure_plugin_registered(&self, name: &str, handler: Arc<dyn LongRunningPlugin>) {
        let Ok(mut registered) = self.registered.write() else {
            error!(plugin = %name, "registered plugins lock poisoned");
            return;
        };
        if registered.contains_key(name) {
            debug!(plugin = %name, "long-running plugin already registered");
            return;
        }
        info!(plugin = %name, "registered long-running plugin");
        registered.insert(name.to_string(), handler);
    }

    pub fn registered_plugins(&self) -> RegisteredPlugins {
        self.registered
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registered_plugins().into_keys().collect();
        names.sort();
        names
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn LongRunningPlugin>> {
        self.registered.read().ok()?.get(name).cloned()
    }

    /// Snapshot of the running-plugins map.
    pub async fn running_plugins(&self) -> PluginInfoMap {
        self.running.read().await.clone()
    }

    /// Whether the registered handler for `name` reports itself running.
    pub fn is_plugin_running(&self, name: &str) -> bool {
        self.handler(name).is_some_and(|h| h.is_running())
    }

    /// Start `name` and record it as running.
    ///
    /// The entry is recorded (and persisted) even when the handler's `start`
    /// fails, so the liveness job keeps retrying it; the start error is still
    /// returned.
    pub async fn start_plugin(
        &self,
        name: &str,
        configuration: String,
        orchestration_dir: PathBuf,
        cancel: CancelFlag,
        output: Arc<dyn OutputSink>,
    ) -> Result<()> {
        let Some(handler) = self.handler(name) else {
            warn!(plugin = %name, "start requested for a plugin that is not registered");
            return Err(AgentError::PluginNotRegistered(name.to_string()));
        };

        let mut running = self.running.write().await;

        info!(plugin = %name, "starting long-running plugin");
        let started = handler
            .start(configuration.clone(), orchestration_dir, cancel, output)
            .await;
        if let Err(err) = &started {
            error!(plugin = %name, error = %err, "long-running plugin failed to start");
        }

        running.insert(name.to_string(), PluginInfo::enabled(name, configuration));
        self.persist(&running);

        started.map_err(AgentError::Other)
    }

    /// Stop `name` and forget it. Stopping a plugin that is not recorded as
    /// running is a no-op.
    pub async fn stop_plugin(&self, name: &str, cancel: CancelFlag) -> Result<()> {
        let mut running = self.running.write().await;

        if !running.contains_key(name) {
            debug!(plugin = %name, "stop requested for a plugin that is not running; nothing to do");
            return Ok(());
        }

        if let Some(handler) = self.handler(name) {
            info!(plugin = %name, "stopping long-running plugin");
            if let Err(err) = handler.stop(cancel).await {
                if handler.is_running() {
                    error!(plugin = %name, error = %err, "failed to stop long-running plugin");
                    return Err(AgentError::Other(err));
                }
                warn!(
                    plugin = %name,
                    error = %err,
                    "stop reported an error but the plugin is no longer running"
                );
            }
        } else {
            warn!(plugin = %name, "recorded plugin has no registered handler; dropping record");
        }

        running.remove(name);
        self.persist(&running);
        Ok(())
    }

    /// Write failures are logged; the in-memory change stands.
    fn persist(&self, running: &PluginInfoMap) {
        if let Err(err) = self.store.write(running) {
            error!(error = %err, "failed to persist long-running plugin state");
        }
    }

    /// Orchestration directory used for `name` when no step supplies one.
    pub fn plugin_output_dir(&self, name: &str) -> PathBuf {
        self.options.orchestration_root.join(dir_name(name))
    }

    /// Queue a start of `info` on the start pool; duplicates are dropped.
    fn submit_start(self: &Arc<Self>, info: PluginInfo) {
        let manager = Arc::clone(self);
        let name = info.name.clone();
        let submitted = self.start_pool.submit(
            name.clone(),
            Box::new(move |flag: CancelFlag| -> BoxFuture<'static, ()> {
                Box::pin(async move {
                    let dir = manager.plugin_output_dir(&info.name);
                    let output = PluginOutput::new(
                        Arc::clone(&manager.fs),
                        Some(manager.options.orchestration_root.clone()),
                    );
                    output.init(&dir_name(&info.name));
                    let output: Arc<dyn OutputSink> = Arc::new(output);
                    if let Err(err) = manager
                        .start_plugin(&info.name, info.configuration.clone(), dir, flag, Arc::clone(&output))
                        .await
                    {
                        warn!(plugin = %info.name, error = %err, "background start failed");
                    }
                    if let Err(err) = output.close() {
                        debug!(plugin = %info.name, error = %err, "could not write plugin output");
                    }
                })
            }),
        );
        match submitted {
            Ok(()) => debug!(plugin = %name, "queued background start"),
            Err(AgentError::DuplicateJob(_)) => {
                debug!(plugin = %name, "start already queued; skipping")
            }
            Err(err) => warn!(plugin = %name, error = %err, "could not queue background start"),
        }
    }

    /// Load persisted state, revive recorded plugins and start the liveness
    /// job.
    ///
    /// A read failure aborts startup of the manager and is returned.
    pub async fn module_execute(self: &Arc<Self>) -> Result<()> {
        let persisted = self.store.read().map_err(|err| {
            error!(error = %err, "failed to read long-running plugin state; manager not started");
            err
        })?;

        let mut revived = Vec::new();
        {
            let mut running = self.running.write().await;
            running.clear();
            let mut dropped = 0usize;
            for (name, info) in persisted {
                if self.handler(&name).is_some() {
                    running.insert(name, info.clone());
                    revived.push(info);
                } else {
                    warn!(plugin = %name, "recorded plugin is no longer registered; dropping");
                    dropped += 1;
                }
            }
            if dropped > 0 {
                self.persist(&running);
            }
        }

        for info in revived {
            info!(plugin = %info.name, "reviving long-running plugin");
            self.submit_start(info);
        }

        self.start_liveness_job();
        info!("long-running plugin manager started");
        Ok(())
    }

    fn start_liveness_job(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let job = every("lrpm-liveness", self.options.liveness_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(manager) = weak.upgrade() {
                    manager.check_liveness().await;
                }
            }
        });
        if let Ok(mut slot) = self.liveness.lock() {
            *slot = Some(job);
        }
    }

    /// Resubmit a start for every recorded plugin that is not running.
    pub async fn check_liveness(self: &Arc<Self>) {
        let stale: Vec<PluginInfo> = {
            let running = self.running.read().await;
            running
                .values()
                .filter(|info| !self.is_plugin_running(&info.name))
                .cloned()
                .collect()
        };

        for info in stale {
            info!(plugin = %info.name, "long-running plugin is not running; restarting");
            self.submit_start(info);
        }
    }

    /// Queue a handler `stop` for `name` on the stop pool. The plugin stays
    /// in the running-plugins map.
    ///
    /// At most one stop per name is in flight; a second submission while the
    /// first runs fails with [`AgentError::DuplicateJob`]. The returned
    /// receiver resolves once the stop has finished.
    pub fn submit_stop(&self, name: &str) -> Result<oneshot::Receiver<()>> {
        let handler = self
            .handler(name)
            .ok_or_else(|| AgentError::PluginNotRegistered(name.to_string()))?;
        let (done_tx, done_rx) = oneshot::channel();
        let plugin = name.to_string();

        self.stop_pool.submit(
            name,
            Box::new(move |flag: CancelFlag| -> BoxFuture<'static, ()> {
                Box::pin(async move {
                    if let Err(err) = handler.stop(flag).await {
                        warn!(plugin = %plugin, error = %err, "failed to stop plugin during shutdown");
                    }
                    let _ = done_tx.send(());
                })
            }),
        )?;
        debug!(plugin = %name, "queued stop");
        Ok(done_rx)
    }

    /// Whether a stop for `name` is queued or running on the stop pool.
    pub fn is_stop_pending(&self, name: &str) -> bool {
        self.stop_pool.has_job(name)
    }

    /// Stop the liveness job, drain the start pool and stop running plugins
    /// through the stop pool.
    ///
    /// `Soft` waits up to the soft timeout for the stops to finish. `Hard`
    /// queues them and returns; the stop pool is drained in the background
    /// with the hard timeout.
    ///
    /// Plugins stopped here stay in the persisted map so they are revived on
    /// the next start.
    pub async fn module_request_stop(&self, stop_type: StopType) {
        info!(?stop_type, "stopping long-running plugin manager");

        let job = self.liveness.lock().ok().and_then(|mut slot| slot.take());
        if let Some(job) = job {
            job.join().await;
        }

        let timeout = match stop_type {
            StopType::Soft => self.options.soft_stop_timeout,
            StopType::Hard => self.options.hard_stop_timeout,
        };

        self.start_pool.shutdown_and_wait(timeout).await;

        let names: Vec<String> = self.running.read().await.keys().cloned().collect();
        let mut queued = 0usize;
        for name in &names {
            match self.submit_stop(name) {
                Ok(_) => queued += 1,
                Err(err) => warn!(plugin = %name, error = %err, "could not queue shutdown stop"),
            }
        }

        match stop_type {
            StopType::Soft => {
                self.stop_pool.shutdown_and_wait(timeout).await;
                info!(count = queued, "long-running plugins stopped");
            }
            StopType::Hard => {
                let pool = Arc::clone(&self.stop_pool);
                tokio::spawn(async move {
                    pool.shutdown_and_wait(timeout).await;
                });
                info!(count = queued, "long-running plugin stops issued");
            }
        }
    }
}

/// `aws:cloudWatch` -> `aws_cloudWatch`.
fn dir_name(plugin_name: &str) -> String {
    plugin_name.replace(':', "_")
}
