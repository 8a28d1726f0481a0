//! Bounded pool of dedicated worker threads for commit fan-out.
//!
//! The scheduler scores and reserves on a single thread, then hands one
//! commit future per cell to a [`WorkPool`] and waits on a [`WaitGroup`].
//! Each worker owns a single-threaded tokio runtime, so commit I/O never
//! needs the caller's runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use cell_auction::config::WorkPoolConfig;
//! use cell_auction::core::{WaitGroup, WorkPool};
//!
//! let pool = WorkPool::new(WorkPoolConfig::new().with_worker_count(4))?;
//! let wg = WaitGroup::new();
//! for cell in cells {
//!     let token = wg.clone();
//!     pool.submit(async move {
//!         commit(cell).await;
//!         drop(token);
//!     })?;
//! }
//! wg.wait();
//! ```

mod native;
mod wait_group;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

pub use native::WorkPool;
pub use wait_group::WaitGroup;

/// Unit of work executed on a pool worker.
pub(crate) type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors that can occur when using a [`WorkPool`].
#[derive(Debug)]
pub enum PoolError {
    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (worker thread spawn failure, channel closed, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,

    /// Jobs currently executing.
    pub active_jobs: u64,

    /// Jobs waiting in the queue.
    pub queued_jobs: u64,

    /// Total jobs run to completion.
    pub completed_jobs: u64,

    /// Total jobs accepted.
    pub submitted_jobs: u64,
}

/// Thread-safe counters behind [`PoolStats`].
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_jobs: AtomicU64,
    pub queued_jobs: AtomicU64,
    pub completed_jobs: AtomicU64,
    pub submitted_jobs: AtomicU64,
}

impl PoolCounters {
    /// Snapshot of the current values.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_jobs: self.active_jobs.load(Ordering::Relaxed),
            queued_jobs: self.queued_jobs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
        }
    }
}
