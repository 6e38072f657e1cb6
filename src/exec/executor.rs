// src/exec/executor.rs

//! Document Executor.
//!
//! One pass over a document runs two tasks:
//!
//! - the Step Execution Engine, which sends `(step_id, results_so_far)` on an
//!   internal channel after every step, and
//! - a listener, which turns each of those into a
//!   [`DocumentProgress::StepCompleted`] on the external channel and folds
//!   the results into the document snapshot.
//!
//! When the engine returns its sender is dropped, the listener drains and
//! hands the snapshot back, and only then is the final aggregate computed,
//! emitted as [`DocumentProgress::DocumentFinished`] and persisted. The
//! external channel closes after that last event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::contracts::{
    DocumentResult, DocumentState, PluginResults, StepId, aggregate_document_status,
};
use crate::engine::{SendReply, StepEngine, UpdateAssociation, noop_association};
use crate::exec::store::DocumentStore;
use crate::task::CancelFlag;

/// Progress of one document pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentProgress {
    /// A step finished; `report` aggregates every result known so far.
    StepCompleted { step_id: StepId, report: DocumentResult },
    /// The pass is over. Always the last event on the channel.
    DocumentFinished(DocumentResult),
}

impl DocumentProgress {
    pub fn report(&self) -> &DocumentResult {
        match self {
            DocumentProgress::StepCompleted { report, .. } => report,
            DocumentProgress::DocumentFinished(report) => report,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, DocumentProgress::DocumentFinished(_))
    }
}

/// Receives association progress after every step.
pub trait AssociationReporter: Send + Sync {
    fn update_association(
        &self,
        execution_id: &str,
        completed_at: DateTime<Utc>,
        results: &PluginResults,
        total_steps: usize,
    ) {
        info!(
            execution_id,
            %completed_at,
            completed = results.len(),
            total_steps,
            "association progress"
        );
    }
}

/// Reporter that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAssociationReporter;

impl AssociationReporter for LoggingAssociationReporter {}

pub struct Executor {
    engine: Arc<StepEngine>,
    reporter: Arc<dyn AssociationReporter>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(engine: Arc<StepEngine>, reporter: Arc<dyn AssociationReporter>) -> Self {
        Self { engine, reporter }
    }

    /// Run one pass of the document held by `store`.
    ///
    /// The returned channel yields one `StepCompleted` per processed step and
    /// a final `DocumentFinished`, then closes. If the document cannot be
    /// loaded the channel closes without any event.
    pub fn run(
        &self,
        cancel: CancelFlag,
        store: Arc<dyn DocumentStore>,
    ) -> mpsc::Receiver<DocumentProgress> {
        let state = match store.load() {
            Ok(state) => state,
            Err(err) => {
                error!(error = %err, "failed to load document state");
                let (_tx, rx) = mpsc::channel(1);
                return rx;
            }
        };

        let (tx, rx) = mpsc::channel(state.step_count() + 1);
        let engine = Arc::clone(&self.engine);
        let reporter = Arc::clone(&self.reporter);
        let document_id = state.document_id().to_string();

        let pass = tokio::spawn(run_pass(engine, reporter, state, store, tx, cancel));
        tokio::spawn(async move {
            if let Err(err) = pass.await {
                if err.is_panic() {
                    error!(document_id = %document_id, "document pass panicked; aborted");
                } else {
                    warn!(document_id = %document_id, error = %err, "document pass task was cancelled");
                }
            }
        });

        rx
    }
}

fn build_report(state: &DocumentState) -> DocumentResult {
    let info = &state.document_information;
    let plugin_results = state.results();
    let total_steps = state.step_count();
    let (status, status_counts) = aggregate_document_status(&plugin_results, total_steps);
    DocumentResult {
        document_id: info.document_id.clone(),
        document_name: info.document_name.clone(),
        document_version: info.document_version.clone(),
        association_id: info.association_id.clone(),
        message_id: info.message_id.clone(),
        status,
        plugin_results,
        status_counts,
        run_count: info.run_count,
        total_steps,
    }
}

fn persist(store: &dyn DocumentStore, state: &DocumentState) {
    if let Err(err) = store.save(state) {
        error!(document_id = %state.document_id(), error = %err, "failed to persist document state");
    }
}

async fn run_pass(
    engine: Arc<StepEngine>,
    reporter: Arc<dyn AssociationReporter>,
    mut state: DocumentState,
    store: Arc<dyn DocumentStore>,
    tx: mpsc::Sender<DocumentProgress>,
    cancel: CancelFlag,
) {
    state.document_information.run_count += 1;
    let document_id = state.document_id().to_string();
    let steps = state.instance_plugins_information.clone();
    let association_id = state.document_information.association_id.clone();

    info!(
        document_id = %document_id,
        run_count = state.document_information.run_count,
        steps = steps.len(),
        "document pass started"
    );

    let (step_tx, mut step_rx) = mpsc::unbounded_channel::<(StepId, PluginResults)>();

    let listener_store = Arc::clone(&store);
    let listener_tx = tx.clone();
    let listener = tokio::spawn(async move {
        let mut state = state;
        while let Some((step_id, results)) = step_rx.recv().await {
            state.apply_results(&results);
            let report = build_report(&state);
            state.document_information.document_status = report.status;
            state.document_information.last_step = Some(step_id.clone());
            persist(listener_store.as_ref(), &state);

            debug!(document_id = %report.document_id, step_id = %step_id, status = %report.status, "step progress");
            if listener_tx
                .send(DocumentProgress::StepCompleted { step_id, report })
                .await
                .is_err()
            {
                debug!("progress receiver dropped");
            }
        }
        state
    });

    let send_reply: SendReply = Arc::new(move |_document_id: &str, step_id: &str, results: &PluginResults| {
        let _ = step_tx.send((step_id.to_string(), results.clone()));
    });
    let update_association: UpdateAssociation = match association_id {
        Some(association_id) => Arc::new(
            move |_execution_id: &str, completed_at: DateTime<Utc>, results: &PluginResults, total: usize| {
                reporter.update_association(&association_id, completed_at, results, total)
            },
        ),
        None => noop_association(),
    };

    // `send_reply` owns the only internal sender; it is dropped when the
    // engine returns, which ends the listener loop.
    let results = engine
        .run_plugins(&document_id, steps, send_reply, update_association, cancel)
        .await;

    let mut state = match listener.await {
        Ok(state) => state,
        Err(err) => {
            error!(document_id = %document_id, error = %err, "result listener failed; final state not persisted");
            return;
        }
    };

    state.apply_results(&results);
    let report = build_report(&state);
    state.document_information.document_status = report.status;

    info!(document_id = %document_id, status = %report.status, "document pass finished");

    if tx.send(DocumentProgress::DocumentFinished(report)).await.is_err() {
        debug!(document_id = %document_id, "progress receiver dropped before final result");
    }
    persist(store.as_ref(), &state);
}
