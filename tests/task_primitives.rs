// tests/task_primitives.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docagent::errors::AgentError;
use docagent::task::{BoxFuture, CancelFlag, CancelState, Job, TaskPool, every};
use tokio::sync::oneshot;

fn job<F>(f: F) -> Job
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    Box::new(move |_flag: CancelFlag| -> BoxFuture<'static, ()> { Box::pin(f) })
}

#[tokio::test]
async fn cancel_flag_states_are_independent() {
    let flag = CancelFlag::new();
    assert_eq!(flag.state(), CancelState::default());

    flag.cancel();
    assert!(flag.is_canceled());
    assert!(!flag.is_shut_down());

    let other = CancelFlag::new();
    other.shut_down();
    assert!(other.is_shut_down());
    assert!(!other.is_canceled());
}

#[tokio::test]
async fn cancel_flag_wait_returns_when_set_from_another_task() {
    let flag = CancelFlag::new();
    let setter = flag.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        setter.shut_down();
    });

    let state = with_timeout(flag.wait()).await;
    assert!(state.shut_down);
    assert!(!state.canceled);
}

#[tokio::test]
async fn cancel_flag_wait_timeout_gives_up() {
    let flag = CancelFlag::new();
    assert_eq!(flag.wait_timeout(Duration::from_millis(20)).await, None);
}

#[tokio::test]
async fn pool_rejects_second_job_with_same_id_while_first_is_in_flight() {
    init_tracing();
    let pool = TaskPool::new("test", 1);
    let (release_tx, release_rx) = oneshot::channel::<()>();

    pool.submit("cw", job(async move {
        let _ = release_rx.await;
    }))
    .unwrap();
    assert!(pool.has_job("cw"));

    let err = pool.submit("cw", job(async {})).unwrap_err();
    assert!(matches!(err, AgentError::DuplicateJob(ref id) if id == "cw"));

    // A different key is accepted.
    pool.submit("other", job(async {})).unwrap();

    release_tx.send(()).unwrap();
    assert!(pool.shutdown_and_wait(Duration::from_secs(2)).await);
    assert!(!pool.has_job("cw"));
}

#[tokio::test]
async fn pool_accepts_same_id_again_after_completion() {
    init_tracing();
    let pool = TaskPool::new("test", 2);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let c = Arc::clone(&counter);
        pool.submit("job", job(async move {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        with_timeout(async {
            while pool.has_job("job") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
    }

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(pool.shutdown_and_wait(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn pool_survives_a_panicking_job() {
    init_tracing();
    let pool = TaskPool::new("test", 1);
    let counter = Arc::new(AtomicUsize::new(0));

    pool.submit("boom", job(async { panic!("job exploded") })).unwrap();
    let c = Arc::clone(&counter);
    pool.submit("after", job(async move {
        c.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();

    assert!(pool.shutdown_and_wait(Duration::from_secs(2)).await);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pool_shutdown_times_out_and_signals_running_jobs() {
    init_tracing();
    let pool = TaskPool::new("test", 1);
    let (seen_tx, seen_rx) = oneshot::channel::<CancelState>();

    pool.submit(
        "slow",
        Box::new(move |flag: CancelFlag| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let state = flag.wait().await;
                let _ = seen_tx.send(state);
            })
        }),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pool.shutdown_and_wait(Duration::from_millis(50)).await);

    let state = with_timeout(seen_rx).await.unwrap();
    assert!(state.shut_down);

    let err = pool.submit("late", job(async {})).unwrap_err();
    assert!(matches!(err, AgentError::PoolShutDown));
}

#[tokio::test(start_paused = true)]
async fn every_ticks_until_stopped() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let scheduled = every("tick", Duration::from_secs(60), move || {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
        }
    });

    // Nothing fires before the first period elapses.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    scheduled.join().await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn every_with_zero_period_still_ticks() {
    init_tracing();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let scheduled = every("zero", Duration::ZERO, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    with_timeout(async {
        while ticks.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(!scheduled.is_stopped());
    scheduled.join().await;
}

#[tokio::test]
async fn pool_with_zero_workers_runs_jobs_on_one_worker() {
    init_tracing();
    let pool = TaskPool::new("zero-workers", 0);
    let (tx, rx) = oneshot::channel();
    pool.submit("only", job(async move {
        let _ = tx.send(());
    }))
    .unwrap();

    with_timeout(rx).await.unwrap();
    assert!(pool.shutdown_and_wait(Duration::from_secs(1)).await);
}
