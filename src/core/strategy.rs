//! Scoring strategies.
//!
//! A strategy bundles an LRP scorer, an optional task scorer, and the filter
//! chain applied before scoring. Lower scores win.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::filter::Selector;
use crate::core::{Cell, Fashion, Lrp, PlacementError, Task};

/// Score penalty per instance of the same group already on a cell.
///
/// Large enough to dominate the utilization term, which is bounded by 1.
pub const LOCALITY_OFFSET: f64 = 1000.0;

/// Scores a cell for an LRP: `(cell, lrp, starting_container_weight)`.
pub type LrpScorer = fn(&Cell, &Lrp, f64) -> Result<f64, PlacementError>;

/// Scores a cell for a task: `(cell, task, starting_container_weight)`.
pub type TaskScorer = fn(&Cell, &Task, f64) -> Result<f64, PlacementError>;

/// Named placement strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStrategy {
    /// Spread: favor emptier cells and penalize co-located replicas.
    #[default]
    Default,
    /// Pack: favor fuller cells, no replica penalty.
    BestFit,
}

impl AuctionStrategy {
    /// Stable name used in configuration and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::BestFit => "best_fit",
        }
    }

    /// LRP scorer for this strategy.
    #[must_use]
    pub fn lrp_scorer(self) -> LrpScorer {
        match self {
            Self::Default => spread_lrp_score,
            Self::BestFit => pack_lrp_score,
        }
    }

    /// Task scorer, if the strategy defines its own.
    #[must_use]
    pub fn task_scorer(self) -> Option<TaskScorer> {
        match self {
            Self::Default => Some(spread_task_score),
            Self::BestFit => None,
        }
    }

    /// Score `cell` for `lrp`.
    ///
    /// # Errors
    ///
    /// The cell's resource-fit error, unchanged.
    pub fn score_lrp(self, cell: &Cell, lrp: &Lrp, weight: f64) -> Result<f64, PlacementError> {
        (self.lrp_scorer())(cell, lrp, weight)
    }

    /// Score `cell` for `task`, falling back to the default task scorer.
    ///
    /// # Errors
    ///
    /// The cell's resource-fit error, unchanged.
    pub fn score_task(self, cell: &Cell, task: &Task, weight: f64) -> Result<f64, PlacementError> {
        let scorer = self.task_scorer().unwrap_or(spread_task_score);
        scorer(cell, task, weight)
    }

    /// Filter chain applied before scoring.
    #[must_use]
    pub fn selectors(self) -> &'static [Selector] {
        match self {
            Self::Default | Self::BestFit => &[Selector::PlacementConstraint],
        }
    }
}

impl fmt::Display for AuctionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuctionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "spread" => Ok(Self::Default),
            "best_fit" | "bestfit" | "pack" => Ok(Self::BestFit),
            other => Err(format!("unknown auction strategy: {other}")),
        }
    }
}

/// Default LRP scorer: worst-fit utilization plus the replica penalty.
///
/// # Errors
///
/// The cell's resource-fit error.
pub fn spread_lrp_score(cell: &Cell, lrp: &Lrp, weight: f64) -> Result<f64, PlacementError> {
    let state = cell.state();
    state
        .resource_match(&lrp.resource)
        .map_err(PlacementError::InsufficientResources)?;

    #[allow(clippy::cast_precision_loss)]
    let locality = LOCALITY_OFFSET * state.instances_of(&lrp.key.process_guid) as f64;
    Ok(state.compute_score(&lrp.resource, weight, Fashion::WorstFit) + locality)
}

/// Best-fit LRP scorer.
///
/// # Errors
///
/// The cell's resource-fit error.
pub fn pack_lrp_score(cell: &Cell, lrp: &Lrp, weight: f64) -> Result<f64, PlacementError> {
    let state = cell.state();
    state
        .resource_match(&lrp.resource)
        .map_err(PlacementError::InsufficientResources)?;

    Ok(state.compute_score(&lrp.resource, weight, Fashion::BestFit))
}

/// Default task scorer: worst-fit utilization plus a per-task penalty.
///
/// # Errors
///
/// The cell's resource-fit error.
pub fn spread_task_score(cell: &Cell, task: &Task, weight: f64) -> Result<f64, PlacementError> {
    let state = cell.state();
    state
        .resource_match(&task.resource)
        .map_err(PlacementError::InsufficientResources)?;

    #[allow(clippy::cast_precision_loss)]
    let locality = LOCALITY_OFFSET * state.tasks.len() as f64;
    Ok(state.compute_score(&task.resource, weight, Fashion::WorstFit) + locality)
}
