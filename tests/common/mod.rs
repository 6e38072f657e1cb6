#![allow(dead_code)]

use tokio::sync::mpsc;

use docagent::exec::DocumentProgress;

pub use docagent_test_utils::{init_tracing, with_timeout};

/// Drain a progress channel until it closes.
pub async fn collect_progress(mut rx: mpsc::Receiver<DocumentProgress>) -> Vec<DocumentProgress> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
