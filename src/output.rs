// src/output.rs

//! Output sink for a step's stdout/stderr.
//!
//! [`PluginOutput`] buffers everything written to it so the engine can put
//! it into the step result, and on [`close`](OutputSink::close) flushes the
//! buffers to `<orchestration_dir>/<name>/stdout` and `.../stderr`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, warn};

use crate::fs::FileSystem;

pub const STDOUT_FILE_NAME: &str = "stdout";
pub const STDERR_FILE_NAME: &str = "stderr";

/// Write target handed to handlers.
pub trait OutputSink: Send + Sync {
    /// Name the sink (usually the step id). Calling it again renames.
    fn init(&self, name: &str);
    fn append_output(&self, text: &str);
    fn append_error(&self, text: &str);
    fn stdout(&self) -> String;
    fn stderr(&self) -> String;
    /// Persist buffered output. Safe to call more than once.
    fn close(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct Buffers {
    name: String,
    stdout: String,
    stderr: String,
}

/// Buffered sink that writes its files through a [`FileSystem`].
///
/// Cloning yields a handle to the same buffers.
#[derive(Debug, Clone)]
pub struct PluginOutput {
    fs: Arc<dyn FileSystem>,
    root: Option<PathBuf>,
    buffers: Arc<Mutex<Buffers>>,
}

impl PluginOutput {
    /// `root` is the orchestration directory; `None` keeps output in memory.
    pub fn new(fs: Arc<dyn FileSystem>, root: Option<PathBuf>) -> Self {
        Self {
            fs,
            root,
            buffers: Arc::new(Mutex::new(Buffers::default())),
        }
    }

    fn with_buffers<T>(&self, f: impl FnOnce(&mut Buffers) -> T) -> Option<T> {
        match self.buffers.lock() {
            Ok(mut buffers) => Some(f(&mut buffers)),
            Err(_) => {
                warn!("plugin output buffers poisoned");
                None
            }
        }
    }
}

impl OutputSink for PluginOutput {
    fn init(&self, name: &str) {
        self.with_buffers(|b| b.name = name.to_string());
    }

    fn append_output(&self, text: &str) {
        self.with_buffers(|b| b.stdout.push_str(text));
    }

    fn append_error(&self, text: &str) {
        self.with_buffers(|b| b.stderr.push_str(text));
    }

    fn stdout(&self) -> String {
        self.with_buffers(|b| b.stdout.clone()).unwrap_or_default()
    }

    fn stderr(&self) -> String {
        self.with_buffers(|b| b.stderr.clone()).unwrap_or_default()
    }

    fn close(&self) -> Result<()> {
        let Some(root) = self.root.as_ref() else {
            return Ok(());
        };
        let Some((name, stdout, stderr)) =
            self.with_buffers(|b| (b.name.clone(), b.stdout.clone(), b.stderr.clone()))
        else {
            return Ok(());
        };

        let dir = if name.is_empty() { root.clone() } else { root.join(&name) };
        self.fs.write(&dir.join(STDOUT_FILE_NAME), stdout.as_bytes())?;
        self.fs.write(&dir.join(STDERR_FILE_NAME), stderr.as_bytes())?;
        debug!(dir = ?dir, "plugin output written");
        Ok(())
    }
}
