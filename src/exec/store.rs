// src/exec/store.rs

//! Where the executor loads and saves document state.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::contracts::DocumentState;
use crate::errors::{AgentError, Result};
use crate::fs::FileSystem;

pub trait DocumentStore: Send + Sync {
    fn load(&self) -> Result<DocumentState>;
    fn save(&self, state: &DocumentState) -> Result<()>;
}

/// One document per JSON file.
#[derive(Debug)]
pub struct FileDocumentStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl FileDocumentStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for FileDocumentStore {
    fn load(&self) -> Result<DocumentState> {
        let contents = self
            .fs
            .read_to_string(&self.path)
            .map_err(|e| AgentError::Persistence(format!("{e:#}")))?;
        let state: DocumentState = serde_json::from_str(&contents)?;
        debug!(path = ?self.path, document_id = %state.document_id(), "loaded document state");
        Ok(state)
    }

    fn save(&self, state: &DocumentState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        self.fs
            .write_atomic(&self.path, &json)
            .map_err(|e| AgentError::Persistence(format!("{e:#}")))?;
        debug!(path = ?self.path, document_id = %state.document_id(), "saved document state");
        Ok(())
    }
}

/// Keeps the document in memory and counts saves.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<DocumentState>,
    saves: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new(state: DocumentState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: AtomicUsize::new(0),
        }
    }

    /// Last saved (or initial) state.
    pub fn snapshot(&self) -> Option<DocumentState> {
        self.state.lock().ok().map(|s| s.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&self) -> Result<DocumentState> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|_| AgentError::LockPoisoned("memory document store"))
    }

    fn save(&self, state: &DocumentState) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| AgentError::LockPoisoned("memory document store"))?;
        *guard = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
