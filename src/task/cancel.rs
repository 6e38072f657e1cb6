// src/task/cancel.rs

//! Cooperative cancellation signal.
//!
//! A [`CancelFlag`] carries two independent states:
//! - `canceled`: the user (or the document owner) asked to stop this work.
//! - `shut_down`: the agent itself is stopping.
//!
//! Handlers poll the flag between long sub-operations, or `wait()` on it in a
//! `tokio::select!`. Nothing in the crate forcibly interrupts a handler that
//! ignores the flag.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Snapshot of a [`CancelFlag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CancelState {
    pub canceled: bool,
    pub shut_down: bool,
}

impl CancelState {
    pub fn is_set(&self) -> bool {
        self.canceled || self.shut_down
    }
}

/// Shared cancellation flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<CancelState>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CancelState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Mark the work as canceled by its owner.
    pub fn cancel(&self) {
        self.tx.send_modify(|state| state.canceled = true);
    }

    /// Mark the work as interrupted by an agent shutdown.
    pub fn shut_down(&self) {
        self.tx.send_modify(|state| state.shut_down = true);
    }

    pub fn is_canceled(&self) -> bool {
        self.tx.borrow().canceled
    }

    pub fn is_shut_down(&self) -> bool {
        self.tx.borrow().shut_down
    }

    pub fn state(&self) -> CancelState {
        *self.tx.borrow()
    }

    /// Wait until either state is set and return the state that released us.
    pub async fn wait(&self) -> CancelState {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(CancelState::is_set).await {
            Ok(state) => *state,
            // The sender lives as long as `self`, so this is unreachable in
            // practice; fall back to the current snapshot.
            Err(_) => self.state(),
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<CancelState> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}
