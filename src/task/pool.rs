// src/task/pool.rs

//! Fixed-size worker pool that executes named jobs.
//!
//! Per job id there is never more than one job queued or running at a time:
//! submitting a second job with the same id while the first is in flight is
//! rejected with [`AgentError::DuplicateJob`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{AgentError, Result};
use crate::task::{BoxFuture, CancelFlag};

/// A unit of work. It receives the cancel flag of its own submission so the
/// pool can signal shutdown to jobs that outlive the drain timeout.
pub type Job = Box<dyn FnOnce(CancelFlag) -> BoxFuture<'static, ()> + Send>;

struct QueuedJob {
    id: String,
    flag: CancelFlag,
    job: Job,
}

struct PoolShared {
    name: String,
    in_flight: Mutex<HashMap<String, CancelFlag>>,
}

impl PoolShared {
    fn finish(&self, id: &str) {
        if let Ok(mut jobs) = self.in_flight.lock() {
            jobs.remove(id);
        }
    }
}

/// Worker pool handle.
pub struct TaskPool {
    shared: Arc<PoolShared>,
    tx: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl TaskPool {
    /// Spawn `workers` worker tasks (at least one) on the current Tokio
    /// runtime.
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        let shared = Arc::new(PoolShared {
            name: name.into(),
            in_flight: Mutex::new(HashMap::new()),
        });

        let (tx, rx) = mpsc::unbounded_channel::<QueuedJob>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|index| {
                let rx = Arc::clone(&rx);
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(index, rx, shared))
            })
            .collect();

        info!(pool = %shared.name, workers, "task pool started");

        Self {
            shared,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Queue a job under `id`.
    pub fn submit(&self, id: impl Into<String>, job: Job) -> Result<()> {
        let id = id.into();
        let tx_guard = self
            .tx
            .lock()
            .map_err(|_| AgentError::LockPoisoned("task pool sender"))?;
        let Some(tx) = tx_guard.as_ref() else {
            return Err(AgentError::PoolShutDown);
        };

        let flag = CancelFlag::new();
        {
            let mut jobs = self
                .shared
                .in_flight
                .lock()
                .map_err(|_| AgentError::LockPoisoned("task pool jobs"))?;
            if jobs.contains_key(&id) {
                debug!(pool = %self.shared.name, job = %id, "rejecting duplicate job");
                return Err(AgentError::DuplicateJob(id));
            }
            jobs.insert(id.clone(), flag.clone());
        }

        if tx.send(QueuedJob { id: id.clone(), flag, job }).is_err() {
            self.shared.finish(&id);
            return Err(AgentError::PoolShutDown);
        }

        debug!(pool = %self.shared.name, job = %id, "job submitted");
        Ok(())
    }

    /// Whether a job with this id is queued or running.
    pub fn has_job(&self, id: &str) -> bool {
        self.shared
            .in_flight
            .lock()
            .map(|jobs| jobs.contains_key(id))
            .unwrap_or(false)
    }

    /// Stop accepting jobs and wait up to `timeout` for the queue to drain.
    ///
    /// Returns `true` if every worker finished in time. On timeout, every job
    /// still in flight gets its cancel flag set to shut down and `false` is
    /// returned.
    pub async fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }

        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        let drained = tokio::time::timeout(timeout, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await
        .is_ok();

        if drained {
            info!(pool = %self.shared.name, "task pool drained");
        } else {
            warn!(
                pool = %self.shared.name,
                timeout_ms = timeout.as_millis() as u64,
                "task pool did not drain in time; signalling shutdown to remaining jobs"
            );
            if let Ok(jobs) = self.shared.in_flight.lock() {
                for flag in jobs.values() {
                    flag.shut_down();
                }
            }
        }

        drained
    }
}

async fn worker_loop(
    index: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    shared: Arc<PoolShared>,
) {
    loop {
        // Hold the receiver lock only while waiting for the next job.
        let next = { rx.lock().await.recv().await };
        let Some(QueuedJob { id, flag, job }) = next else {
            break;
        };

        debug!(pool = %shared.name, worker = index, job = %id, "job started");

        // Run on its own task so a panicking job does not take the worker down.
        if let Err(err) = tokio::spawn(job(flag)).await {
            if err.is_panic() {
                error!(pool = %shared.name, job = %id, "job panicked");
            } else {
                warn!(pool = %shared.name, job = %id, error = %err, "job aborted");
            }
        }

        shared.finish(&id);
        debug!(pool = %shared.name, worker = index, job = %id, "job finished");
    }

    debug!(pool = %shared.name, worker = index, "worker exiting (queue closed)");
}
