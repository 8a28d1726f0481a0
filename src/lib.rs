//! # Cell Auction
//!
//! A placement engine that assigns long-running process instances (LRPs) and
//! one-off tasks to worker cells grouped into availability zones.
//!
//! Each pass runs an auction per workload: cells are filtered by placement
//! constraints, scored by a pluggable strategy, and the lowest score wins.
//! Winners are reserved in memory as the pass goes, so later auctions see
//! earlier placements, and all reservations are committed to the cells
//! concurrently at the end.
//!
//! ## Key Features
//!
//! - **Strategies**: `Default` spreads replicas and load, `BestFit` packs cells
//! - **Specific diagnostics**: constraint failures report the most actionable
//!   reason seen across zones; resource failures name the common bottleneck
//! - **Zone balancing**: LRPs try the zone with the fewest instances of their
//!   group first
//! - **Inflight cap**: bounds how many containers may start in one pass
//! - **Concurrent commit**: one job per cell on a bounded worker pool, with
//!   rejected work reported as failed
//! - **Control loop**: batching, deduplication, fetch retry, and bounded
//!   resubmission of failed auctions
//!
//! ## Scheduling a pass
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cell_auction::config::WorkPoolConfig;
//! use cell_auction::core::{zone::build_zones, AuctionRequest, Scheduler, SchedulerSettings, WorkPool};
//! use cell_auction::util::SystemClock;
//!
//! let pool = Arc::new(WorkPool::new(WorkPoolConfig::new())?);
//! let zones = build_zones(states, &committer);
//! let mut scheduler = Scheduler::new(pool, zones, Arc::new(SystemClock), SchedulerSettings::default());
//! let results = scheduler.schedule(AuctionRequest { lrps, tasks });
//! ```
//!
//! ## Running the control loop
//!
//! ```rust,ignore
//! use cell_auction::builders::build_auction_runner;
//! use cell_auction::config::AuctioneerConfig;
//!
//! let cfg = AuctioneerConfig::from_env()?;
//! let runner = build_auction_runner(&cfg, delegate, state_source, committer, Arc::new(SystemClock))?;
//! let handle = runner.spawn()?;
//! handle.batch().add_lrp_starts(&starts);
//! ```
//!
//! For complete scenarios, see `tests/scheduler_test.rs` and
//! `tests/auction_runner_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Placement domain: workloads, cells, zones, strategies, and the auction.
pub mod core;
/// Configuration models for the auctioneer and its work pool.
pub mod config;
/// Builders to construct auction components from configuration.
pub mod builders;
/// Batching and the auction control loop.
pub mod runtime;
/// Shared utilities.
pub mod util;
