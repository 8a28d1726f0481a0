//! Error types for placement, commit, and fetch operations.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resource dimension a cell can run out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Container slots.
    Containers,
    /// Disk in megabytes.
    Disk,
    /// Memory in megabytes.
    Memory,
}

impl ResourceKind {
    /// All resource kinds, in display order.
    pub const ALL: [Self; 3] = [Self::Containers, Self::Disk, Self::Memory];

    /// Stable lowercase name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Containers => "containers",
            Self::Disk => "disk",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of resource kinds that blocked a placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProblems(BTreeSet<ResourceKind>);

impl ResourceProblems {
    /// Every resource kind; the starting point when narrowing across cells.
    #[must_use]
    pub fn all() -> Self {
        Self(ResourceKind::ALL.into_iter().collect())
    }

    /// Record a violated kind.
    pub fn insert(&mut self, kind: ResourceKind) {
        self.0.insert(kind);
    }

    /// Whether `kind` is part of the set.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.0.contains(&kind)
    }

    /// Whether no kind was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop every kind not also present in `other`.
    pub fn retain_common(&mut self, other: &Self) {
        self.0.retain(|kind| other.0.contains(kind));
    }

    /// Iterate kinds in display order.
    pub fn iter(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ResourceKind> for ResourceProblems {
    fn from_iter<I: IntoIterator<Item = ResourceKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ResourceProblems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(ResourceKind::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

/// Why no cell in a zone (or in any zone) satisfied a placement constraint.
///
/// Variants are ordered by how specific, and therefore how actionable, the
/// diagnostic is. See [`ConstraintMismatch::specificity`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintMismatch {
    /// The zone has no cells at all.
    #[error("found no cells in zone")]
    NoCellInZone,
    /// No cell supports the requested root filesystem.
    #[error("found no compatible cell")]
    RootFs,
    /// Cells matched the root filesystem but lack a required volume driver.
    #[error("found no compatible cell with volume drivers")]
    VolumeDrivers,
    /// Cells matched rootfs and volume drivers but not the placement tags.
    #[error("found no compatible cell with placement tags \"{}\"", .0.join(", "))]
    PlacementTags(Vec<String>),
}

impl ConstraintMismatch {
    /// Ordinal rank: higher means the cell got further through the filter.
    #[must_use]
    pub const fn specificity(&self) -> u8 {
        match self {
            Self::NoCellInZone => 0,
            Self::RootFs => 1,
            Self::VolumeDrivers => 2,
            Self::PlacementTags(_) => 3,
        }
    }
}

/// Per-item placement failure. None of these abort a scheduling pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// No cell had enough of the listed resources.
    #[error("insufficient resources: {0}")]
    InsufficientResources(ResourceProblems),
    /// No cell satisfied the placement constraint.
    #[error(transparent)]
    ConstraintMismatch(#[from] ConstraintMismatch),
    /// The pass-wide cap on starting containers was reached.
    #[error("exceeded max inflight container creation")]
    InflightCapExceeded,
    /// No zones or cells were reachable for this pass.
    #[error("unable to communicate to compatible cells")]
    CellCommunication,
    /// The winning cell rejected the work at commit time.
    #[error("cell rejected the work at commit")]
    CommitRejected,
}

/// Failure of a whole remote commit call.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Transport-level failure talking to the cell.
    #[error("transport error: {0}")]
    Transport(String),
    /// The call did not complete in time.
    #[error("commit timed out")]
    Timeout,
}

/// Failure to discover the cells available for a pass.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The discovery backend could not be reached.
    #[error("cell discovery unavailable: {0}")]
    Unavailable(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
