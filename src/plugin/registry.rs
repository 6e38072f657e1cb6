// src/plugin/registry.rs

//! Step type name -> handler mapping.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::plugin::WorkerPlugin;

/// Immutable after construction. Worker handlers are looked up first, then
/// long-running category adapters.
#[derive(Default)]
pub struct PluginRegistry {
    workers: HashMap<String, Arc<dyn WorkerPlugin>>,
    long_running: HashMap<String, Arc<dyn WorkerPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("workers", &self.worker_names())
            .field("long_running", &self.long_running_names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_worker(&mut self, name: impl Into<String>, handler: Arc<dyn WorkerPlugin>) {
        let name = name.into();
        debug!(plugin = %name, "registering worker plugin");
        self.workers.insert(name, handler);
    }

    /// Register the adapter that forwards a long-running category to the
    /// manager.
    pub fn register_long_running(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn WorkerPlugin>,
    ) {
        let name = name.into();
        debug!(plugin = %name, "registering long-running plugin adapter");
        self.long_running.insert(name, adapter);
    }

    pub fn with_worker(mut self, name: impl Into<String>, handler: Arc<dyn WorkerPlugin>) -> Self {
        self.register_worker(name, handler);
        self
    }

    pub fn with_long_running(
        mut self,
        name: impl Into<String>,
        adapter: Arc<dyn WorkerPlugin>,
    ) -> Self {
        self.register_long_running(name, adapter);
        self
    }

    /// Resolve a step type name to its handler.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn WorkerPlugin>> {
        self.workers
            .get(name)
            .or_else(|| self.long_running.get(name))
            .cloned()
    }

    pub fn is_long_running(&self, name: &str) -> bool {
        !self.workers.contains_key(name) && self.long_running.contains_key(name)
    }

    pub fn worker_names(&self) -> Vec<String> {
        sorted_keys(&self.workers)
    }

    pub fn long_running_names(&self) -> Vec<String> {
        sorted_keys(&self.long_running)
    }
}

fn sorted_keys(map: &HashMap<String, Arc<dyn WorkerPlugin>>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort();
    names
}

/// Build-once holder for the process registry.
///
/// Concurrent document runs may ask for the registry at the same time; the
/// first caller builds it, everybody else gets the same `Arc`.
#[derive(Debug, Default)]
pub struct RegistryCell {
    cell: OnceLock<Arc<PluginRegistry>>,
}

impl RegistryCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_init(&self, build: impl FnOnce() -> PluginRegistry) -> Arc<PluginRegistry> {
        Arc::clone(self.cell.get_or_init(|| {
            let registry = build();
            info!(
                workers = ?registry.worker_names(),
                long_running = ?registry.long_running_names(),
                "plugin registry built"
            );
            Arc::new(registry)
        }))
    }

    pub fn get(&self) -> Option<Arc<PluginRegistry>> {
        self.cell.get().cloned()
    }
}
