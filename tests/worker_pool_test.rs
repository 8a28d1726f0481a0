//! Integration tests for WorkPool and WaitGroup
//!
//! These tests validate:
//! - Fan-out of commit-style futures with a completion barrier
//! - Shared accumulation under a lock
//! - Back-pressure with a small queue
//! - Shutdown semantics and statistics

use cell_auction::config::WorkPoolConfig;
use cell_auction::core::{PoolError, WaitGroup, WorkPool};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn pool(worker_count: usize, max_queue_depth: usize) -> WorkPool {
    WorkPool::new(
        WorkPoolConfig::new()
            .with_worker_count(worker_count)
            .with_max_queue_depth(max_queue_depth),
    )
    .unwrap()
}

// ============================================================================
// EXECUTION
// ============================================================================

#[test]
fn test_fan_out_collects_under_lock() {
    let pool = pool(4, 8);
    let collected = Arc::new(Mutex::new(Vec::new()));
    let wg = WaitGroup::new();

    for cell in 0..32 {
        let collected = Arc::clone(&collected);
        let token = wg.clone();
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            collected.lock().push(cell);
            drop(token);
        })
        .unwrap();
    }
    wg.wait();

    let mut collected = collected.lock().clone();
    collected.sort_unstable();
    assert_eq!(collected, (0..32).collect::<Vec<_>>());
    pool.shutdown();
}

#[test]
fn test_jobs_run_concurrently() {
    let pool = pool(4, 8);
    let wg = WaitGroup::new();
    let start = Instant::now();

    for _ in 0..4 {
        let token = wg.clone();
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(token);
        })
        .unwrap();
    }
    wg.wait();

    assert!(start.elapsed() < Duration::from_millis(700));
    pool.shutdown();
}

#[test]
fn test_small_queue_applies_back_pressure_without_losing_jobs() {
    let pool = pool(1, 1);
    let ran = Arc::new(AtomicUsize::new(0));
    let wg = WaitGroup::new();

    for _ in 0..10 {
        let ran = Arc::clone(&ran);
        let token = wg.clone();
        pool.submit(async move {
            ran.fetch_add(1, Ordering::SeqCst);
            drop(token);
        })
        .unwrap();
    }
    wg.wait();

    assert_eq!(ran.load(Ordering::SeqCst), 10);
    pool.shutdown();
}

// ============================================================================
// SHUTDOWN AND STATS
// ============================================================================

#[test]
fn test_shutdown_drains_queue_and_rejects_new_jobs() {
    let pool = pool(1, 16);
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let ran = Arc::clone(&ran);
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    pool.shutdown();

    assert_eq!(ran.load(Ordering::SeqCst), 5);
    assert!(matches!(pool.submit(async {}), Err(PoolError::PoolShutdown)));

    let stats = pool.stats();
    assert_eq!(stats.worker_count, 1);
    assert_eq!(stats.submitted_jobs, 5);
    assert_eq!(stats.completed_jobs, 5);
    assert_eq!(stats.active_jobs, 0);
}

#[test]
fn test_shutdown_is_idempotent() {
    let pool = pool(2, 4);
    pool.shutdown();
    pool.shutdown();
    assert!(matches!(pool.submit(async {}), Err(PoolError::PoolShutdown)));
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = WorkPool::new(WorkPoolConfig::new().with_max_queue_depth(0)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid configuration: max_queue_depth must be greater than 0"
    );
}
