//! Workload, work-batch, and auction request/result types.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Resource demand of a single workload. Every workload also needs exactly
/// one container slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Disk in megabytes.
    pub disk_mb: u64,
}

impl Resource {
    /// Create a demand.
    #[must_use]
    pub const fn new(memory_mb: u64, disk_mb: u64) -> Self {
        Self { memory_mb, disk_mb }
    }
}

/// Hard requirements a cell must satisfy to host a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConstraint {
    /// Root filesystem URI, e.g. `preloaded:cflinuxfs3` or `docker:///busybox`.
    pub rootfs: String,
    /// Volume drivers the cell must provide.
    #[serde(default)]
    pub volume_drivers: Vec<String>,
    /// Placement tags the cell must carry.
    #[serde(default)]
    pub placement_tags: Vec<String>,
}

impl PlacementConstraint {
    /// Constraint requiring only a root filesystem.
    #[must_use]
    pub fn new(rootfs: impl Into<String>) -> Self {
        Self {
            rootfs: rootfs.into(),
            volume_drivers: Vec::new(),
            placement_tags: Vec::new(),
        }
    }

    /// Require volume drivers.
    #[must_use]
    pub fn with_volume_drivers<I, S>(mut self, drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volume_drivers = drivers.into_iter().map(Into::into).collect();
        self
    }

    /// Require placement tags.
    #[must_use]
    pub fn with_placement_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.placement_tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Identity of one LRP instance: its group plus replica index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LrpKey {
    /// Group identifier shared by all replicas.
    pub process_guid: String,
    /// Replica index within the group.
    pub index: u32,
}

impl LrpKey {
    /// Create a key.
    #[must_use]
    pub fn new(process_guid: impl Into<String>, index: u32) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
        }
    }
}

impl fmt::Display for LrpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.process_guid, self.index)
    }
}

/// A long-running process instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lrp {
    /// Group and index.
    pub key: LrpKey,
    /// Owning domain.
    pub domain: String,
    /// Resource demand.
    pub resource: Resource,
    /// Placement requirements.
    pub constraint: PlacementConstraint,
}

impl Lrp {
    /// Create an LRP instance.
    #[must_use]
    pub fn new(
        key: LrpKey,
        domain: impl Into<String>,
        resource: Resource,
        constraint: PlacementConstraint,
    ) -> Self {
        Self {
            key,
            domain: domain.into(),
            resource,
            constraint,
        }
    }
}

/// A one-off unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub task_guid: String,
    /// Owning domain.
    pub domain: String,
    /// Resource demand.
    pub resource: Resource,
    /// Placement requirements.
    pub constraint: PlacementConstraint,
}

impl Task {
    /// Create a task.
    #[must_use]
    pub fn new(
        task_guid: impl Into<String>,
        domain: impl Into<String>,
        resource: Resource,
        constraint: PlacementConstraint,
    ) -> Self {
        Self {
            task_guid: task_guid.into(),
            domain: domain.into(),
            resource,
            constraint,
        }
    }
}

/// A batch of assignments sent to, or rejected by, one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    /// LRP instances.
    #[serde(default)]
    pub lrps: Vec<Lrp>,
    /// Tasks.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Work {
    /// Whether the batch holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lrps.is_empty() && self.tasks.is_empty()
    }
}

/// Caller-facing request to start one or more replicas of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrpStartRequest {
    /// Group identifier.
    pub process_guid: String,
    /// Owning domain.
    pub domain: String,
    /// Replica indices to start.
    pub indices: Vec<u32>,
    /// Per-instance resource demand.
    pub resource: Resource,
    /// Placement requirements.
    pub constraint: PlacementConstraint,
}

impl LrpStartRequest {
    /// One [`Lrp`] per requested index.
    #[must_use]
    pub fn instances(&self) -> Vec<Lrp> {
        self.indices
            .iter()
            .map(|&index| {
                Lrp::new(
                    LrpKey::new(self.process_guid.clone(), index),
                    self.domain.clone(),
                    self.resource,
                    self.constraint.clone(),
                )
            })
            .collect()
    }
}

/// Auction state for one LRP instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LrpAuction {
    /// The instance being placed.
    pub lrp: Lrp,
    /// When the caller enqueued it.
    pub queue_time: Instant,
    /// Winning cell id, empty until placed.
    pub winner: String,
    /// Scheduling passes this auction has been through.
    pub attempts: u32,
    /// Time from enqueue to successful placement.
    pub wait_duration: Duration,
    /// Reason for the most recent failure, empty on success.
    pub placement_error: String,
}

impl LrpAuction {
    /// Fresh auction enqueued at `queue_time`.
    #[must_use]
    pub fn new(lrp: Lrp, queue_time: Instant) -> Self {
        Self {
            lrp,
            queue_time,
            winner: String::new(),
            attempts: 0,
            wait_duration: Duration::ZERO,
            placement_error: String::new(),
        }
    }

    /// Identity used for deduplication and commit reconciliation.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.lrp.key.to_string()
    }
}

/// Auction state for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskAuction {
    /// The task being placed.
    pub task: Task,
    /// When the caller enqueued it.
    pub queue_time: Instant,
    /// Winning cell id, empty until placed.
    pub winner: String,
    /// Scheduling passes this auction has been through.
    pub attempts: u32,
    /// Time from enqueue to successful placement.
    pub wait_duration: Duration,
    /// Reason for the most recent failure, empty on success.
    pub placement_error: String,
}

impl TaskAuction {
    /// Fresh auction enqueued at `queue_time`.
    #[must_use]
    pub fn new(task: Task, queue_time: Instant) -> Self {
        Self {
            task,
            queue_time,
            winner: String::new(),
            attempts: 0,
            wait_duration: Duration::ZERO,
            placement_error: String::new(),
        }
    }

    /// Identity used for deduplication and commit reconciliation.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.task.task_guid.clone()
    }
}

/// Everything to place in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionRequest {
    /// LRP instances.
    pub lrps: Vec<LrpAuction>,
    /// Tasks.
    pub tasks: Vec<TaskAuction>,
}

impl AuctionRequest {
    /// Whether there is nothing to place.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lrps.is_empty() && self.tasks.is_empty()
    }

    /// Append `other` and drop any auctions already present, keeping the
    /// first occurrence of each identifier.
    pub fn merge(&mut self, other: Self) {
        self.lrps.extend(other.lrps);
        self.tasks.extend(other.tasks);
        self.dedupe();
    }

    /// Drop repeated identifiers, keeping the first occurrence.
    pub fn dedupe(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.lrps.retain(|auction| seen.insert(auction.identifier()));
        seen.clear();
        self.tasks.retain(|auction| seen.insert(auction.identifier()));
    }
}

/// Outcome of a pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionResults {
    /// Placed LRPs, each with a winner and wait duration.
    pub successful_lrps: Vec<LrpAuction>,
    /// Placed tasks, each with a winner and wait duration.
    pub successful_tasks: Vec<TaskAuction>,
    /// LRPs that could not be placed, each with a placement error.
    pub failed_lrps: Vec<LrpAuction>,
    /// Tasks that could not be placed, each with a placement error.
    pub failed_tasks: Vec<TaskAuction>,
}

impl AuctionResults {
    /// Whether the pass produced no results at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.successful_lrps.is_empty()
            && self.successful_tasks.is_empty()
            && self.failed_lrps.is_empty()
            && self.failed_tasks.is_empty()
    }
}
