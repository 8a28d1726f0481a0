//! `WorkPool` backed by OS threads.
//!
//! Each worker thread owns a single-threaded tokio runtime and blocks on a
//! bounded channel. Dropping the sender is the shutdown signal: workers
//! finish whatever is still queued and exit.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::WorkPoolConfig;

use super::{Job, PoolCounters, PoolError, PoolStats};

/// Fixed-size pool of worker threads running futures to completion.
pub struct WorkPool {
    /// Pool configuration.
    config: WorkPoolConfig,

    /// Job sender. `None` once shut down.
    job_tx: Mutex<Option<Sender<Job>>>,

    /// Statistics counters.
    counters: Arc<PoolCounters>,

    /// Shutdown flag.
    shutdown: AtomicBool,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl WorkPool {
    /// Start `config.worker_count` worker threads.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Internal` if a worker thread cannot be spawned
    pub fn new(config: WorkPoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (job_tx, job_rx) = bounded::<Job>(config.max_queue_depth);
        let counters = Arc::new(PoolCounters::default());

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            match spawn_worker(worker_id, job_rx.clone(), Arc::clone(&counters), config.thread_stack_size) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    // Closing the channel lets the already-started workers exit.
                    drop(job_tx);
                    return Err(err);
                }
            }
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "WorkPool initialized"
        );

        Ok(Self {
            config,
            job_tx: Mutex::new(Some(job_tx)),
            counters,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(workers),
        })
    }

    /// Queue `job` for execution.
    ///
    /// Blocks while the queue is full; commit fan-out is bounded by the
    /// number of cells, so back-pressure here only throttles the submitter.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolShutdown` if the pool has been shut down.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        // Clone the sender so a full queue never blocks while holding the lock.
        let job_tx = self.job_tx.lock().clone().ok_or(PoolError::PoolShutdown)?;

        self.counters.queued_jobs.fetch_add(1, Ordering::Relaxed);
        if job_tx.send(Box::pin(job)).is_err() {
            self.counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
            return Err(PoolError::PoolShutdown);
        }
        self.counters.submitted_jobs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Stop accepting jobs, let workers drain the queue, and join them.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down work pool");
        self.job_tx.lock().take();

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            if worker.join().is_ok() {
                debug!(worker_id = idx, "Worker joined");
            } else {
                warn!(worker_id = idx, "Worker panicked");
            }
        }

        info!(worker_count, "Work pool shut down complete");
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        // Detach rather than join; explicit shutdown() is the graceful path.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.job_tx.lock().take();
            debug!("WorkPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Spawn a worker thread.
fn spawn_worker(
    worker_id: usize,
    job_rx: Receiver<Job>,
    counters: Arc<PoolCounters>,
    stack_size: usize,
) -> Result<JoinHandle<()>, PoolError> {
    thread::Builder::new()
        .name(format!("auction-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "Worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to create worker runtime");
                    return;
                }
            };

            // recv() fails once every sender is gone and the queue is empty.
            while let Ok(job) = job_rx.recv() {
                counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
                counters.active_jobs.fetch_add(1, Ordering::Relaxed);

                rt.block_on(job);

                counters.active_jobs.fetch_sub(1, Ordering::Relaxed);
                counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
            }

            debug!(worker_id, "Worker thread exiting");
        })
        .map_err(|e| PoolError::Internal(format!("failed to spawn worker thread: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WaitGroup;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pool(workers: usize) -> WorkPool {
        WorkPool::new(
            WorkPoolConfig::new()
                .with_worker_count(workers)
                .with_max_queue_depth(4),
        )
        .unwrap()
    }

    #[test]
    fn test_runs_every_job() {
        let pool = pool(2);
        let ran = Arc::new(AtomicUsize::new(0));
        let wg = WaitGroup::new();

        for _ in 0..20 {
            let ran = Arc::clone(&ran);
            let token = wg.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                ran.fetch_add(1, Ordering::Relaxed);
                drop(token);
            })
            .unwrap();
        }
        wg.wait();

        assert_eq!(ran.load(Ordering::Relaxed), 20);
        pool.shutdown();
        let stats = pool.stats();
        assert_eq!(stats.submitted_jobs, 20);
        assert_eq!(stats.completed_jobs, 20);
        assert_eq!(stats.queued_jobs, 0);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = pool(1);
        pool.shutdown();
        assert!(matches!(pool.submit(async {}), Err(PoolError::PoolShutdown)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = WorkPool::new(WorkPoolConfig::new().with_worker_count(0)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }
}
