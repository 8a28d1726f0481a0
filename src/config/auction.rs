//! Auctioneer configuration.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::WorkPoolConfig;
use crate::core::{AuctionStrategy, SchedulerSettings};

/// Default pause before retrying a cycle whose cell fetch failed.
pub const DEFAULT_FETCH_RETRY_PAUSE_MS: u64 = 500;

/// Default number of times a failed auction is resubmitted.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default weight of each starting container in a cell's score.
pub const DEFAULT_STARTING_CONTAINER_WEIGHT: f64 = 0.25;

/// Configuration errors, raised before any pass runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// An environment variable held an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    Env {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// A field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level auctioneer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctioneerConfig {
    /// Scoring strategy.
    pub strategy: AuctionStrategy,
    /// Score added per container a cell is already starting.
    pub starting_container_weight: f64,
    /// Cap on containers starting cluster-wide during a pass; 0 disables it.
    pub starting_container_count_maximum: u32,
    /// How many times a failed auction is resubmitted.
    pub max_retries: u32,
    /// Pause before retrying a cycle after a failed cell fetch.
    pub fetch_retry_pause_ms: u64,
    /// Commit worker pool sizing.
    pub work_pool: WorkPoolConfig,
}

impl Default for AuctioneerConfig {
    fn default() -> Self {
        Self {
            strategy: AuctionStrategy::Default,
            starting_container_weight: DEFAULT_STARTING_CONTAINER_WEIGHT,
            starting_container_count_maximum: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            fetch_retry_pause_ms: DEFAULT_FETCH_RETRY_PAUSE_MS,
            work_pool: WorkPoolConfig::new(),
        }
    }
}

impl AuctioneerConfig {
    /// Validate every field, including the nested pool configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if !self.starting_container_weight.is_finite() || self.starting_container_weight < 0.0 {
            return Err("starting_container_weight must be a finite, non-negative number".into());
        }
        if self.fetch_retry_pause_ms == 0 {
            return Err("fetch_retry_pause_ms must be greater than 0".into());
        }
        self.work_pool
            .validate()
            .map_err(|e| format!("work_pool invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate().map_err(ConfigError::Invalid)?;
        Ok(cfg)
    }

    /// Load `.env` (if present) and read `AUCTION_*` variables over defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Env`] for unparsable values, [`ConfigError::Invalid`]
    /// if the result fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`AuctioneerConfig::from_env`] with an explicit variable source.
    ///
    /// Recognized keys: `AUCTION_STRATEGY`, `AUCTION_STARTING_CONTAINER_WEIGHT`,
    /// `AUCTION_STARTING_CONTAINER_COUNT_MAXIMUM`, `AUCTION_MAX_RETRIES`,
    /// `AUCTION_FETCH_RETRY_PAUSE_MS`, `AUCTION_WORKER_COUNT`,
    /// `AUCTION_MAX_QUEUE_DEPTH`, `AUCTION_THREAD_STACK_SIZE`.
    ///
    /// # Errors
    ///
    /// See [`AuctioneerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AUCTION_STRATEGY") {
            cfg.strategy = parse_var("AUCTION_STRATEGY", &v)?;
        }
        if let Some(v) = get("AUCTION_STARTING_CONTAINER_WEIGHT") {
            cfg.starting_container_weight = parse_var("AUCTION_STARTING_CONTAINER_WEIGHT", &v)?;
        }
        if let Some(v) = get("AUCTION_STARTING_CONTAINER_COUNT_MAXIMUM") {
            cfg.starting_container_count_maximum =
                parse_var("AUCTION_STARTING_CONTAINER_COUNT_MAXIMUM", &v)?;
        }
        if let Some(v) = get("AUCTION_MAX_RETRIES") {
            cfg.max_retries = parse_var("AUCTION_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("AUCTION_FETCH_RETRY_PAUSE_MS") {
            cfg.fetch_retry_pause_ms = parse_var("AUCTION_FETCH_RETRY_PAUSE_MS", &v)?;
        }
        if let Some(v) = get("AUCTION_WORKER_COUNT") {
            cfg.work_pool.worker_count = parse_var("AUCTION_WORKER_COUNT", &v)?;
        }
        if let Some(v) = get("AUCTION_MAX_QUEUE_DEPTH") {
            cfg.work_pool.max_queue_depth = parse_var("AUCTION_MAX_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = get("AUCTION_THREAD_STACK_SIZE") {
            cfg.work_pool.thread_stack_size = parse_var("AUCTION_THREAD_STACK_SIZE", &v)?;
        }

        cfg.validate().map_err(ConfigError::Invalid)?;
        Ok(cfg)
    }

    /// Per-pass scheduler settings derived from this configuration.
    #[must_use]
    pub const fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            strategy: self.strategy,
            starting_container_weight: self.starting_container_weight,
            starting_container_count_maximum: self.starting_container_count_maximum,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}
