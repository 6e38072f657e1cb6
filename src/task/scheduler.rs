// src/task/scheduler.rs

//! "Run this every N" primitive used by the liveness check.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Shortest period [`every`] will schedule.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a periodic job started with [`every`].
///
/// The job keeps running until [`stop`](Self::stop) is called or the handle
/// is dropped.
#[derive(Debug)]
pub struct ScheduledJob {
    name: String,
    quit: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ScheduledJob {
    /// Signal the job loop to exit. A tick already in progress is allowed to
    /// finish.
    pub fn stop(&mut self) {
        if let Some(quit) = self.quit.take() {
            debug!(job = %self.name, "stopping scheduled job");
            let _ = quit.send(());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.quit.is_none() || self.handle.is_finished()
    }

    /// Stop the job and wait for the loop to exit.
    pub async fn join(mut self) {
        self.stop();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for ScheduledJob {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Invoke `job` every `period`, starting one period from now. A zero period
/// is raised to [`MIN_PERIOD`].
///
/// Each tick runs on its own Tokio task; a tick that panics is logged and the
/// schedule continues.
pub fn every<F, Fut>(name: impl Into<String>, period: Duration, job: F) -> ScheduledJob
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    if period.is_zero() {
        warn!(job = %name, "zero period requested; using the minimum period");
    }
    let period = period.max(MIN_PERIOD);
    let (quit_tx, mut quit_rx) = oneshot::channel::<()>();
    let loop_name = name.clone();

    let handle = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(job = %loop_name, period_ms = period.as_millis() as u64, "scheduled job started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(job = %loop_name, "scheduled job tick");
                    if let Err(err) = tokio::spawn(job()).await {
                        if err.is_panic() {
                            error!(job = %loop_name, "scheduled job tick panicked");
                        }
                    }
                }
                _ = &mut quit_rx => {
                    break;
                }
            }
        }

        info!(job = %loop_name, "scheduled job stopped");
    });

    ScheduledJob {
        name,
        quit: Some(quit_tx),
        handle,
    }
}
