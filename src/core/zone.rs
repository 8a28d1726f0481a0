//! Availability zones and per-auction zone candidates.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::core::{Cell, CellState, WorkCommitter};

/// Named set of cells for one pass.
#[derive(Debug)]
pub struct Zone {
    name: String,
    cells: Vec<Cell>,
}

impl Zone {
    /// Create a zone.
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// Zone name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cells in the zone.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Mutable access for reservation and commit.
    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }
}

/// Cells of one zone still in the running for a single auction.
///
/// Indexes into the scheduler's zone list so filtering never has to borrow
/// or clone cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneCandidates {
    /// Index of the zone.
    pub zone: usize,
    /// Indices of eligible cells within the zone.
    pub cells: Vec<usize>,
    /// Instances of the auctioned group already in the zone (0 for tasks).
    pub instances: usize,
}

/// Candidates covering every cell of every zone, annotated with the number of
/// instances of `process_guid` each zone already hosts.
///
/// Pass `None` for tasks: every zone counts as empty and therefore ties.
#[must_use]
pub fn accumulate_zones_by_instances(zones: &[Zone], process_guid: Option<&str>) -> Vec<ZoneCandidates> {
    zones
        .iter()
        .enumerate()
        .map(|(zone, z)| ZoneCandidates {
            zone,
            cells: (0..z.cells.len()).collect(),
            instances: process_guid.map_or(0, |guid| {
                z.cells.iter().map(|cell| cell.state().instances_of(guid)).sum()
            }),
        })
        .collect()
}

/// Order candidates emptiest zone first, keeping the existing order on ties.
pub fn sort_zones_by_instances(candidates: &mut [ZoneCandidates]) {
    candidates.sort_by_key(|candidate| candidate.instances);
}

/// Group polled snapshots into zones.
///
/// Evacuating cells are left out. Zones come back in name order and cells in
/// id order so a pass over the same snapshots always scans identically.
pub fn build_zones(states: HashMap<String, CellState>, committer: &Arc<dyn WorkCommitter>) -> Vec<Zone> {
    let mut grouped: BTreeMap<String, Vec<Cell>> = BTreeMap::new();

    for (guid, state) in states {
        if state.evacuating {
            debug!(cell_guid = %guid, zone = %state.zone, "skipping evacuating cell");
            continue;
        }
        grouped
            .entry(state.zone.clone())
            .or_default()
            .push(Cell::new(guid, Arc::clone(committer), state));
    }

    grouped
        .into_iter()
        .map(|(name, mut cells)| {
            cells.sort_by(|a, b| a.guid().cmp(b.guid()));
            Zone::new(name, cells)
        })
        .collect()
}
