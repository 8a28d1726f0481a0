//! Placement domain: workloads, cells, zones, strategies, and the auction.

pub mod cell;
pub mod cell_state;
pub mod client;
pub mod error;
pub mod filter;
pub mod scheduler;
pub mod strategy;
pub mod types;
pub mod worker_pool;
pub mod zone;

pub use cell::{Cell, CommitFuture};
pub use cell_state::{CellState, Fashion, Resources, RootFsProvider};
pub use client::{CellAddress, CellStateSource, WorkCommitter};
pub use error::{
    AppResult, CommitError, ConstraintMismatch, FetchError, PlacementError, ResourceKind, ResourceProblems,
};
pub use filter::Selector;
pub use scheduler::{Scheduler, SchedulerSettings};
pub use strategy::{AuctionStrategy, LOCALITY_OFFSET};
pub use types::{
    AuctionRequest, AuctionResults, Lrp, LrpAuction, LrpKey, LrpStartRequest, PlacementConstraint, Resource,
    Task, TaskAuction, Work,
};
pub use worker_pool::{PoolError, PoolStats, WaitGroup, WorkPool};
pub use zone::Zone;
