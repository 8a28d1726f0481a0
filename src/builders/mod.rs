//! Builders to construct auction components from configuration.

pub mod runner_builder;

pub use runner_builder::{build_auction_runner, build_scheduler, build_work_pool};
