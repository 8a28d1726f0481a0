//! Zone and cell filter pipeline.
//!
//! Each cell is classified along an escalating ladder (rootfs, then volume
//! drivers, then placement tags). A zone with at least one eligible cell
//! passes those cells on. A zone without one reports the furthest any of
//! its cells got along the ladder. When every zone fails the pipeline
//! reports the most specific zone error.

use serde::{Deserialize, Serialize};

use crate::core::zone::{sort_zones_by_instances, Zone, ZoneCandidates};
use crate::core::{ConstraintMismatch, PlacementConstraint};

/// One stage of a strategy's filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Root filesystem, volume driver, and placement tag matching.
    PlacementConstraint,
}

impl Selector {
    /// Narrow `candidates` to cells satisfying `constraint`.
    ///
    /// # Errors
    ///
    /// The most specific zone-level mismatch when no zone survives.
    pub fn filter(
        self,
        zones: &[Zone],
        candidates: Vec<ZoneCandidates>,
        constraint: &PlacementConstraint,
    ) -> Result<Vec<ZoneCandidates>, ConstraintMismatch> {
        match self {
            Self::PlacementConstraint => filter_zones(zones, candidates, constraint),
        }
    }
}

/// Classify one cell; `None` means eligible.
fn classify(zone: &Zone, cell: usize, constraint: &PlacementConstraint) -> Option<ConstraintMismatch> {
    let cell = &zone.cells()[cell];
    if !cell.match_rootfs(constraint) {
        Some(ConstraintMismatch::RootFs)
    } else if !cell.match_volume_drivers(constraint) {
        Some(ConstraintMismatch::VolumeDrivers)
    } else if !cell.match_placement_tags(constraint) {
        Some(ConstraintMismatch::PlacementTags(constraint.placement_tags.clone()))
    } else {
        None
    }
}

/// Eligible cells of one zone.
///
/// # Errors
///
/// [`ConstraintMismatch::NoCellInZone`] for a zone without cells, otherwise
/// the most specific reason blocking any of its cells.
pub fn filter_cells(
    zone: &Zone,
    candidate: &ZoneCandidates,
    constraint: &PlacementConstraint,
) -> Result<Vec<usize>, ConstraintMismatch> {
    let mut eligible = Vec::with_capacity(candidate.cells.len());
    let mut most_specific = ConstraintMismatch::NoCellInZone;

    for &cell in &candidate.cells {
        match classify(zone, cell, constraint) {
            None => eligible.push(cell),
            Some(err) => {
                if err.specificity() > most_specific.specificity() {
                    most_specific = err;
                }
            }
        }
    }

    if eligible.is_empty() {
        Err(most_specific)
    } else {
        Ok(eligible)
    }
}

/// Apply [`filter_cells`] to every candidate zone, keeping input order.
///
/// # Errors
///
/// The most specific zone error, only when every zone fails.
pub fn filter_zones(
    zones: &[Zone],
    candidates: Vec<ZoneCandidates>,
    constraint: &PlacementConstraint,
) -> Result<Vec<ZoneCandidates>, ConstraintMismatch> {
    let mut surviving = Vec::with_capacity(candidates.len());
    let mut most_specific = ConstraintMismatch::NoCellInZone;

    for mut candidate in candidates {
        match filter_cells(&zones[candidate.zone], &candidate, constraint) {
            Ok(cells) => {
                candidate.cells = cells;
                surviving.push(candidate);
            }
            Err(err) => {
                if err.specificity() > most_specific.specificity() {
                    most_specific = err;
                }
            }
        }
    }

    if surviving.is_empty() {
        Err(most_specific)
    } else {
        Ok(surviving)
    }
}

/// Run a filter chain in order.
///
/// # Errors
///
/// The first selector error.
pub fn apply_selectors(
    selectors: &[Selector],
    zones: &[Zone],
    mut candidates: Vec<ZoneCandidates>,
    constraint: &PlacementConstraint,
) -> Result<Vec<ZoneCandidates>, ConstraintMismatch> {
    for selector in selectors {
        candidates = selector.filter(zones, candidates, constraint)?;
    }
    Ok(candidates)
}

/// Filter chain for an LRP, with survivors ordered emptiest zone first.
///
/// # Errors
///
/// See [`apply_selectors`].
pub fn filter_lrp_zones(
    selectors: &[Selector],
    zones: &[Zone],
    candidates: Vec<ZoneCandidates>,
    constraint: &PlacementConstraint,
) -> Result<Vec<ZoneCandidates>, ConstraintMismatch> {
    let mut surviving = apply_selectors(selectors, zones, candidates, constraint)?;
    sort_zones_by_instances(&mut surviving);
    Ok(surviving)
}

/// Filter chain for a task; zone order is left untouched.
///
/// # Errors
///
/// See [`apply_selectors`].
pub fn filter_task_zones(
    selectors: &[Selector],
    zones: &[Zone],
    candidates: Vec<ZoneCandidates>,
    constraint: &PlacementConstraint,
) -> Result<Vec<ZoneCandidates>, ConstraintMismatch> {
    apply_selectors(selectors, zones, candidates, constraint)
}
