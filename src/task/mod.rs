// src/task/mod.rs

//! Concurrency primitives shared by the execution core and the long-running
//! plugin manager.
//!
//! - [`cancel`] holds the cooperative [`CancelFlag`] passed to every handler.
//! - [`pool`] is a fixed-size worker pool keyed by job id.
//! - [`scheduler`] runs a callback periodically until stopped.

use std::future::Future;
use std::pin::Pin;

pub mod cancel;
pub mod pool;
pub mod scheduler;

pub use cancel::{CancelFlag, CancelState};
pub use pool::{Job, TaskPool};
pub use scheduler::{ScheduledJob, every};

/// Boxed, sendable future used at every dynamic-dispatch seam of the crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
