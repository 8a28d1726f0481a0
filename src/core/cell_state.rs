//! Snapshot of a cell's capacity and capabilities, and the node-local
//! resource-fit contract evaluated against it.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::{Lrp, ResourceKind, ResourceProblems, Resource, Task};

/// Capacity along the three schedulable dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Disk in megabytes.
    pub disk_mb: u64,
    /// Container slots.
    pub containers: u32,
}

impl Resources {
    /// Create a capacity triple.
    #[must_use]
    pub const fn new(memory_mb: u64, disk_mb: u64, containers: u32) -> Self {
        Self {
            memory_mb,
            disk_mb,
            containers,
        }
    }

    /// Capacity left after placing `demand` (one container included).
    #[must_use]
    pub const fn after(&self, demand: &Resource) -> Self {
        Self {
            memory_mb: self.memory_mb.saturating_sub(demand.memory_mb),
            disk_mb: self.disk_mb.saturating_sub(demand.disk_mb),
            containers: self.containers.saturating_sub(1),
        }
    }

    /// Mean fraction of `total` still free across the three dimensions.
    #[must_use]
    pub fn free_fraction(&self, total: &Self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        fn ratio(free: u64, total: u64) -> f64 {
            if total == 0 {
                0.0
            } else {
                free as f64 / total as f64
            }
        }

        (ratio(self.memory_mb, total.memory_mb)
            + ratio(self.disk_mb, total.disk_mb)
            + ratio(u64::from(self.containers), u64::from(total.containers)))
            / 3.0
    }
}

/// How a root filesystem scheme is served by a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootFsProvider {
    /// Any path under the scheme, e.g. docker images.
    Arbitrary,
    /// Only the listed stacks, e.g. preloaded rootfses.
    Fixed(BTreeSet<String>),
}

impl RootFsProvider {
    fn serves(&self, path: &str) -> bool {
        match self {
            Self::Arbitrary => true,
            Self::Fixed(stacks) => stacks.contains(path),
        }
    }
}

/// Which utilization direction a score rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fashion {
    /// Lower score for emptier cells (spread).
    WorstFit,
    /// Lower score for fuller cells (pack).
    BestFit,
}

/// Polled state of one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    /// Availability zone the cell belongs to.
    pub zone: String,
    /// Root filesystem schemes this cell can run.
    #[serde(default)]
    pub rootfs_providers: HashMap<String, RootFsProvider>,
    /// Capacity still unclaimed.
    pub available: Resources,
    /// Full capacity.
    pub total: Resources,
    /// LRP instances already hosted.
    #[serde(default)]
    pub lrps: Vec<Lrp>,
    /// Tasks already hosted.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Containers currently being created.
    #[serde(default)]
    pub starting_container_count: u32,
    /// Installed volume drivers.
    #[serde(default)]
    pub volume_drivers: Vec<String>,
    /// Tags every workload placed here must request.
    #[serde(default)]
    pub placement_tags: Vec<String>,
    /// Tags a workload may additionally request.
    #[serde(default)]
    pub optional_placement_tags: Vec<String>,
    /// Cell is draining and must not receive work.
    #[serde(default)]
    pub evacuating: bool,
}

impl CellState {
    /// Empty cell in `zone` with all of `total` available.
    #[must_use]
    pub fn new(zone: impl Into<String>, total: Resources) -> Self {
        Self {
            zone: zone.into(),
            rootfs_providers: HashMap::new(),
            available: total,
            total,
            lrps: Vec::new(),
            tasks: Vec::new(),
            starting_container_count: 0,
            volume_drivers: Vec::new(),
            placement_tags: Vec::new(),
            optional_placement_tags: Vec::new(),
            evacuating: false,
        }
    }

    /// Add a rootfs provider for `scheme`.
    #[must_use]
    pub fn with_rootfs_provider(mut self, scheme: impl Into<String>, provider: RootFsProvider) -> Self {
        self.rootfs_providers.insert(scheme.into(), provider);
        self
    }

    /// Set the installed volume drivers.
    #[must_use]
    pub fn with_volume_drivers<I, S>(mut self, drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volume_drivers = drivers.into_iter().map(Into::into).collect();
        self
    }

    /// Set required and optional placement tags.
    #[must_use]
    pub fn with_placement_tags<I, S>(mut self, required: I, optional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.placement_tags = required.into_iter().map(Into::into).collect();
        self.optional_placement_tags = optional.into_iter().map(Into::into).collect();
        self
    }

    /// Set the starting container count.
    #[must_use]
    pub const fn with_starting_containers(mut self, count: u32) -> Self {
        self.starting_container_count = count;
        self
    }

    /// Record already-running LRPs, consuming their resources.
    #[must_use]
    pub fn with_lrps(mut self, lrps: impl IntoIterator<Item = Lrp>) -> Self {
        for lrp in lrps {
            self.add_lrp(&lrp);
        }
        self
    }

    /// Check `demand` against available capacity, naming every short dimension.
    ///
    /// # Errors
    ///
    /// Returns the set of resource kinds that do not fit.
    pub fn resource_match(&self, demand: &Resource) -> Result<(), ResourceProblems> {
        let mut problems = ResourceProblems::default();
        if self.available.disk_mb < demand.disk_mb {
            problems.insert(ResourceKind::Disk);
        }
        if self.available.memory_mb < demand.memory_mb {
            problems.insert(ResourceKind::Memory);
        }
        if self.available.containers < 1 {
            problems.insert(ResourceKind::Containers);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    /// Utilization score after placing `demand`, plus the starting-container
    /// term. Lower is better.
    #[must_use]
    pub fn compute_score(&self, demand: &Resource, starting_container_weight: f64, fashion: Fashion) -> f64 {
        let free = self.available.after(demand).free_fraction(&self.total);
        let utilization = match fashion {
            Fashion::WorstFit => 1.0 - free,
            Fashion::BestFit => free,
        };
        utilization + f64::from(self.starting_container_count) * starting_container_weight
    }

    /// Claim resources for `lrp` and record it as hosted.
    pub fn add_lrp(&mut self, lrp: &Lrp) {
        self.available = self.available.after(&lrp.resource);
        self.lrps.push(lrp.clone());
    }

    /// Claim resources for `task` and record it as hosted.
    pub fn add_task(&mut self, task: &Task) {
        self.available = self.available.after(&task.resource);
        self.tasks.push(task.clone());
    }

    /// Number of hosted instances of `process_guid`.
    #[must_use]
    pub fn instances_of(&self, process_guid: &str) -> usize {
        self.lrps
            .iter()
            .filter(|lrp| lrp.key.process_guid == process_guid)
            .count()
    }

    /// Whether the cell can run the `scheme:path` root filesystem.
    #[must_use]
    pub fn match_rootfs(&self, rootfs: &str) -> bool {
        let (scheme, path) = rootfs.split_once(':').unwrap_or((rootfs, ""));
        self.rootfs_providers
            .get(scheme)
            .is_some_and(|provider| provider.serves(path))
    }

    /// Whether every requested driver is installed.
    #[must_use]
    pub fn match_volume_drivers(&self, drivers: &[String]) -> bool {
        drivers.iter().all(|driver| self.volume_drivers.contains(driver))
    }

    /// The cell's required tags must all be requested, and every requested
    /// tag must be either required or optional on the cell.
    #[must_use]
    pub fn match_placement_tags(&self, desired: &[String]) -> bool {
        let desired: HashSet<&str> = desired.iter().map(String::as_str).collect();
        let required: HashSet<&str> = self.placement_tags.iter().map(String::as_str).collect();
        let optional: HashSet<&str> = self
            .optional_placement_tags
            .iter()
            .map(String::as_str)
            .collect();

        required.is_subset(&desired)
            && desired
                .iter()
                .all(|tag| required.contains(tag) || optional.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LrpKey, PlacementConstraint};

    fn linux_cell() -> CellState {
        CellState::new("z1", Resources::new(100, 200, 50)).with_rootfs_provider(
            "preloaded",
            RootFsProvider::Fixed(["linux".to_string()].into_iter().collect()),
        )
    }

    #[test]
    fn resource_match_names_each_kind() {
        let mut state = linux_cell();
        assert_eq!(
            state.resource_match(&Resource::new(1000, 10)).unwrap_err().to_string(),
            "memory"
        );
        assert_eq!(
            state.resource_match(&Resource::new(10, 1000)).unwrap_err().to_string(),
            "disk"
        );
        state.available.containers = 0;
        assert_eq!(
            state.resource_match(&Resource::new(1000, 1000)).unwrap_err().to_string(),
            "containers, disk, memory"
        );
    }

    #[test]
    fn add_lrp_consumes_capacity() {
        let mut state = linux_cell();
        let lrp = Lrp::new(
            LrpKey::new("pg", 0),
            "domain",
            Resource::new(10, 20),
            PlacementConstraint::new("preloaded:linux"),
        );
        state.add_lrp(&lrp);
        assert_eq!(state.available, Resources::new(90, 180, 49));
        assert_eq!(state.instances_of("pg"), 1);
    }

    #[test]
    fn rootfs_providers() {
        let state = linux_cell().with_rootfs_provider("docker", RootFsProvider::Arbitrary);
        assert!(state.match_rootfs("preloaded:linux"));
        assert!(!state.match_rootfs("preloaded:windows"));
        assert!(state.match_rootfs("docker:///busybox"));
        assert!(!state.match_rootfs("oci:///busybox"));
    }

    #[test]
    fn placement_tags_required_and_optional() {
        let state = linux_cell().with_placement_tags(vec!["a"], vec!["b"]);
        assert!(state.match_placement_tags(&["a".into()]));
        assert!(state.match_placement_tags(&["a".into(), "b".into()]));
        assert!(!state.match_placement_tags(&["b".into()]));
        assert!(!state.match_placement_tags(&["a".into(), "c".into()]));
    }

    #[test]
    fn fashions_point_in_opposite_directions() {
        let empty = linux_cell();
        let mut busy = linux_cell();
        busy.available.memory_mb = 50;
        let demand = Resource::new(10, 10);

        assert!(
            empty.compute_score(&demand, 0.0, Fashion::WorstFit)
                < busy.compute_score(&demand, 0.0, Fashion::WorstFit)
        );
        assert!(
            empty.compute_score(&demand, 0.0, Fashion::BestFit)
                > busy.compute_score(&demand, 0.0, Fashion::BestFit)
        );
    }
}
