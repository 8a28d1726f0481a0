//! Builders to construct the work pool, schedulers, and runners from configuration.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::info;

use crate::config::{AuctioneerConfig, WorkPoolConfig};
use crate::core::{AppResult, CellStateSource, Scheduler, WorkCommitter, WorkPool, Zone};
use crate::runtime::{AuctionRunner, AuctionRunnerDelegate};
use crate::util::Clock;

/// Start a work pool sized by `cfg`.
///
/// # Errors
///
/// Fails if the configuration is invalid or a worker cannot be spawned.
pub fn build_work_pool(cfg: &WorkPoolConfig) -> AppResult<Arc<WorkPool>> {
    let pool = WorkPool::new(cfg.clone()).context("failed to start work pool")?;
    Ok(Arc::new(pool))
}

/// Scheduler for one pass over `zones`.
///
/// # Errors
///
/// Fails if `cfg` does not validate.
pub fn build_scheduler(
    cfg: &AuctioneerConfig,
    work_pool: Arc<WorkPool>,
    zones: Vec<Zone>,
    clock: Arc<dyn Clock>,
) -> AppResult<Scheduler> {
    cfg.validate()
        .map_err(|e| anyhow!(e))
        .context("auctioneer config invalid")?;
    Ok(Scheduler::new(work_pool, zones, clock, cfg.scheduler_settings()))
}

/// Validate `cfg`, start its work pool, and assemble a runner.
///
/// # Errors
///
/// Fails if `cfg` does not validate or the work pool cannot start.
pub fn build_auction_runner(
    cfg: &AuctioneerConfig,
    delegate: Arc<dyn AuctionRunnerDelegate>,
    state_source: Arc<dyn CellStateSource>,
    committer: Arc<dyn WorkCommitter>,
    clock: Arc<dyn Clock>,
) -> AppResult<AuctionRunner> {
    cfg.validate()
        .map_err(|e| anyhow!(e))
        .context("auctioneer config invalid")?;
    let work_pool = build_work_pool(&cfg.work_pool)?;

    info!(
        strategy = %cfg.strategy,
        max_retries = cfg.max_retries,
        starting_container_count_maximum = cfg.starting_container_count_maximum,
        "auction runner built"
    );
    Ok(AuctionRunner::new(delegate, state_source, committer, work_pool, clock, cfg))
}
