// tests/worker_pool.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cmdtask::engine::WorkerPool;
use cmdtask_test_utils::{init_tracing, with_timeout};
use tokio::sync::{mpsc, Barrier};

#[tokio::test]
async fn size_is_at_least_one() {
    init_tracing();
    let pool = WorkerPool::new(0);
    assert_eq!(pool.size(), 1);
    pool.shutdown().await;

    assert!(WorkerPool::default_size() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_runs_more_than_size_jobs() {
    init_tracing();
    let pool = WorkerPool::new(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        let job = Box::pin(async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            running.fetch_sub(1, Ordering::SeqCst);
        });
        assert!(pool.execute(job).is_ok());
    }

    with_timeout(pool.shutdown()).await;
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(running.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn jobs_wait_in_queue_while_workers_are_busy() {
    init_tracing();
    let pool = WorkerPool::new(1);
    let gate = Arc::new(Barrier::new(2));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    {
        let gate = Arc::clone(&gate);
        let done_tx = done_tx.clone();
        pool.execute(Box::pin(async move {
            gate.wait().await;
            let _ = done_tx.send("first");
        }))
        .ok()
        .unwrap();
    }
    pool.execute(Box::pin(async move {
        let _ = done_tx.send("second");
    }))
    .ok()
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.busy_workers(), 1);
    assert_eq!(pool.queued_jobs(), 1);
    assert!(done_rx.try_recv().is_err());

    gate.wait().await;
    assert_eq!(with_timeout(done_rx.recv()).await, Some("first"));
    assert_eq!(with_timeout(done_rx.recv()).await, Some("second"));

    with_timeout(pool.shutdown()).await;
}

#[tokio::test]
async fn panicking_job_does_not_kill_the_worker() {
    init_tracing();
    let pool = WorkerPool::new(1);
    let (tx, mut rx) = mpsc::unbounded_channel();

    pool.execute(Box::pin(async { panic!("job blew up"); }))
        .ok()
        .unwrap();
    pool.execute(Box::pin(async move {
        let _ = tx.send(());
    }))
    .ok()
    .unwrap();

    assert_eq!(with_timeout(rx.recv()).await, Some(()));
    with_timeout(pool.shutdown()).await;
}

#[tokio::test]
async fn shutdown_rejects_new_jobs() {
    init_tracing();
    let pool = WorkerPool::new(2);
    with_timeout(pool.shutdown()).await;

    assert!(pool.is_closed());
    assert!(pool.execute(Box::pin(async {})).is_err());

    // A second shutdown is harmless.
    with_timeout(pool.shutdown()).await;
}
