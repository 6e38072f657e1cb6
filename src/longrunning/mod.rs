// src/longrunning/mod.rs

//! Long-running plugin management.
//!
//! - [`manager`] owns registration, start/stop, persistence, revival and the
//!   liveness job.
//! - [`store`] persists the running-plugins map.
//! - [`invoker`] is the worker adapter that forwards enable/disable steps to
//!   the manager.

pub mod invoker;
pub mod manager;
pub mod store;

pub use invoker::{EnableCheck, LongRunningCommand, LongRunningInvoker, StartType};
pub use manager::{LongRunningManager, ManagerOptions, RegisteredPlugins, StopType};
pub use store::{
    FilePluginStore, MemoryPluginStore, PLUGIN_STATE_FILE_PATH, PluginInfo, PluginInfoMap,
    PluginInfoStore, PluginRunState,
};
