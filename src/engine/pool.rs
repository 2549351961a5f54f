// src/engine/pool.rs

//! Bounded worker pool.
//!
//! A fixed number of worker loops share a single job queue. Each job keeps
//! its worker busy until it completes, so at most `size` jobs run at once and
//! the rest wait in the queue. Dequeue order between waiting jobs is not
//! guaranteed.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Unit of work executed by a worker.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>;

#[derive(Debug, Default)]
struct PoolStats {
    queued: AtomicUsize,
    busy: AtomicUsize,
}

/// Explicitly owned pool of workers on the current Tokio runtime.
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let stats = Arc::new(PoolStats::default());

        let workers = (0..size)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let stats = Arc::clone(&stats);
                tokio::spawn(worker_loop(worker, rx, stats))
            })
            .collect();

        info!(workers = size, "worker pool started");

        Self {
            size,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            stats,
        }
    }

    /// Pool sized from the available parallelism of the host.
    pub fn with_default_size() -> Self {
        Self::new(Self::default_size())
    }

    pub fn default_size() -> usize {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently being executed.
    pub fn busy_workers(&self) -> usize {
        self.stats.busy.load(Ordering::SeqCst)
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn queued_jobs(&self) -> usize {
        self.stats.queued.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }

    /// Queue a job. Hands the job back if the pool is shut down.
    pub fn execute(&self, job: Job) -> Result<(), Job> {
        let guard = lock(&self.tx);
        let Some(tx) = guard.as_ref() else {
            return Err(job);
        };

        self.stats.queued.fetch_add(1, Ordering::SeqCst);
        tx.send(job).map_err(|rejected| {
            self.stats.queued.fetch_sub(1, Ordering::SeqCst);
            rejected.0
        })
    }

    /// Stop accepting jobs, let the workers drain the queue, and wait for
    /// them to exit.
    pub async fn shutdown(&self) {
        let tx = lock(&self.tx).take();
        if tx.is_none() {
            debug!("worker pool already shut down");
        }
        drop(tx);

        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for (worker, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker, error = %e, "worker ended abnormally");
            }
        }

        info!("worker pool shut down");
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn worker_loop(worker: usize, rx: SharedReceiver, stats: Arc<PoolStats>) {
    debug!(worker, "worker started");

    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        stats.queued.fetch_sub(1, Ordering::SeqCst);
        stats.busy.fetch_add(1, Ordering::SeqCst);

        // Run the job on its own task so a panic only loses that job.
        if let Err(e) = tokio::spawn(job).await {
            error!(worker, error = %e, "job panicked");
        }

        stats.busy.fetch_sub(1, Ordering::SeqCst);
    }

    debug!(worker, "worker finished (queue closed)");
}
