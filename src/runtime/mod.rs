//! Batching and the auction control loop.

pub mod auction_runner;
pub mod batch;

pub use auction_runner::{
    resubmit_failed_auctions, AuctionRunner, AuctionRunnerDelegate, CycleOutcome, CycleSummary, RunnerHandle,
};
pub use batch::Batch;
