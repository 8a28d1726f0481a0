//! Configuration models for the auctioneer and its work pool.

pub mod auction;
pub mod pool;

pub use auction::{AuctioneerConfig, ConfigError};
pub use pool::WorkPoolConfig;
