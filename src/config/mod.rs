// src/config/mod.rs

//! Agent configuration.
//!
//! - `model.rs` holds the TOML-backed data model.
//! - `loader.rs` reads `Agent.toml` from disk.
//! - `validate.rs` turns a `RawAgentConfig` into a checked `AgentConfig`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{AgentConfig, AgentSection, IdentitySection, LongRunningSection, RawAgentConfig};
