//! The per-pass auction.
//!
//! A [`Scheduler`] is built from freshly polled zones, runs exactly one
//! [`Scheduler::schedule`] pass, and is then discarded. Scoring and
//! reservation run sequentially on the caller's thread so every score sees
//! the reservations made before it. Only the final commit fans out across
//! the [`WorkPool`].

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::core::filter::{filter_lrp_zones, filter_task_zones};
use crate::core::zone::{accumulate_zones_by_instances, Zone, ZoneCandidates};
use crate::core::{
    AuctionRequest, AuctionResults, AuctionStrategy, Cell, LrpAuction, PlacementError, ResourceProblems,
    TaskAuction, WaitGroup, Work, WorkPool,
};
use crate::util::Clock;

/// Knobs for a single pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    /// Scoring strategy.
    pub strategy: AuctionStrategy,
    /// Score added per container a cell is already starting.
    pub starting_container_weight: f64,
    /// Cap on containers starting cluster-wide; 0 disables it.
    pub starting_container_count_maximum: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            strategy: AuctionStrategy::Default,
            starting_container_weight: 0.0,
            starting_container_count_maximum: 0,
        }
    }
}

/// Position of a cell in the scheduler's zone list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRef {
    zone: usize,
    cell: usize,
}

/// Places one batch of auctions onto a fixed set of zones.
pub struct Scheduler {
    work_pool: Arc<WorkPool>,
    zones: Vec<Zone>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("zones", &self.zones.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Scheduler over `zones`, committing through `work_pool`.
    pub fn new(
        work_pool: Arc<WorkPool>,
        zones: Vec<Zone>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            work_pool,
            zones,
            clock,
            settings,
        }
    }

    /// Zones as they stand, including reservations made so far.
    #[must_use]
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Run one pass over `request`.
    ///
    /// Every auction comes back either successful (with a winner and wait
    /// duration) or failed (with a placement error); none is dropped and no
    /// failure aborts the pass.
    pub fn schedule(&mut self, request: AuctionRequest) -> AuctionResults {
        let span = info_span!(
            "schedule",
            pass_id = %Uuid::new_v4(),
            lrps = request.lrps.len(),
            tasks = request.tasks.len()
        );
        let _guard = span.enter();

        if self.zones.is_empty() {
            warn!("no zones available, failing every auction");
            let results = fail_all(request, &PlacementError::CellCommunication);
            return self.mark_results(results);
        }

        let AuctionRequest { mut lrps, mut tasks } = request;
        sort_lrp_auctions(&mut lrps);
        sort_task_auctions(&mut tasks);
        let (first_instances, replicas) = split_lrps(lrps);

        let mut inflight = self.starting_containers();
        let mut results = AuctionResults::default();

        for auction in first_instances {
            self.place_lrp(auction, &mut inflight, &mut results);
        }
        for auction in tasks {
            self.place_task(auction, inflight, &mut results);
        }
        for auction in replicas {
            self.place_lrp(auction, &mut inflight, &mut results);
        }

        let rejected = self.commit_cells();
        demote_rejected(&mut results, &rejected);

        let results = self.mark_results(results);
        info!(
            successful_lrps = results.successful_lrps.len(),
            successful_tasks = results.successful_tasks.len(),
            failed_lrps = results.failed_lrps.len(),
            failed_tasks = results.failed_tasks.len(),
            "scheduling pass complete"
        );
        results
    }

    /// Sum of the starting-container counts the cells reported.
    fn starting_containers(&self) -> u32 {
        self.zones
            .iter()
            .flat_map(Zone::cells)
            .map(Cell::starting_container_count)
            .sum()
    }

    const fn cap_reached(&self, inflight: u32) -> bool {
        let maximum = self.settings.starting_container_count_maximum;
        maximum > 0 && inflight >= maximum
    }

    fn place_lrp(&mut self, mut auction: LrpAuction, inflight: &mut u32, results: &mut AuctionResults) {
        if self.cap_reached(*inflight) {
            debug!(lrp_guid = %auction.lrp.key, inflight = *inflight, "inflight cap reached");
            auction.placement_error = PlacementError::InflightCapExceeded.to_string();
            results.failed_lrps.push(auction);
            return;
        }

        match self.schedule_lrp(&auction) {
            Ok(winner) => {
                debug!(lrp_guid = %auction.lrp.key, cell_guid = %winner, "lrp placed");
                auction.winner = winner;
                *inflight += 1;
                results.successful_lrps.push(auction);
            }
            Err(err) => {
                debug!(lrp_guid = %auction.lrp.key, error = %err, "lrp not placed");
                auction.placement_error = err.to_string();
                results.failed_lrps.push(auction);
            }
        }
    }

    fn place_task(&mut self, mut auction: TaskAuction, inflight: u32, results: &mut AuctionResults) {
        if self.cap_reached(inflight) {
            debug!(task_guid = %auction.task.task_guid, inflight, "inflight cap reached");
            auction.placement_error = PlacementError::InflightCapExceeded.to_string();
            results.failed_tasks.push(auction);
            return;
        }

        match self.schedule_task(&auction) {
            Ok(winner) => {
                debug!(task_guid = %auction.task.task_guid, cell_guid = %winner, "task placed");
                auction.winner = winner;
                results.successful_tasks.push(auction);
            }
            Err(err) => {
                debug!(task_guid = %auction.task.task_guid, error = %err, "task not placed");
                auction.placement_error = err.to_string();
                results.failed_tasks.push(auction);
            }
        }
    }

    fn schedule_lrp(&mut self, auction: &LrpAuction) -> Result<String, PlacementError> {
        let lrp = &auction.lrp;
        let SchedulerSettings {
            strategy,
            starting_container_weight: weight,
            ..
        } = self.settings;

        let candidates = accumulate_zones_by_instances(&self.zones, Some(&lrp.key.process_guid));
        let candidates = filter_lrp_zones(strategy.selectors(), &self.zones, candidates, &lrp.constraint)?;
        let winner = run_auction(&self.zones, &candidates, |cell| strategy.score_lrp(cell, lrp, weight))?;

        let cell = &mut self.zones[winner.zone].cells_mut()[winner.cell];
        cell.reserve_lrp(lrp).inspect_err(|err| {
            error!(
                lrp_guid = %lrp.key,
                cell_guid = %cell.guid(),
                error = %err,
                "reservation failed after a successful score"
            );
        })?;
        Ok(cell.guid().to_string())
    }

    fn schedule_task(&mut self, auction: &TaskAuction) -> Result<String, PlacementError> {
        let task = &auction.task;
        let SchedulerSettings {
            strategy,
            starting_container_weight: weight,
            ..
        } = self.settings;

        let candidates = accumulate_zones_by_instances(&self.zones, None);
        let candidates = filter_task_zones(strategy.selectors(), &self.zones, candidates, &task.constraint)?;
        let winner = run_auction(&self.zones, &candidates, |cell| strategy.score_task(cell, task, weight))?;

        let cell = &mut self.zones[winner.zone].cells_mut()[winner.cell];
        cell.reserve_task(task).inspect_err(|err| {
            error!(
                task_guid = %task.task_guid,
                cell_guid = %cell.guid(),
                error = %err,
                "reservation failed after a successful score"
            );
        })?;
        Ok(cell.guid().to_string())
    }

    /// Commit every cell holding reservations concurrently and collect the
    /// work the cells rejected.
    fn commit_cells(&mut self) -> Work {
        let rejected = Arc::new(Mutex::new(Work::default()));
        let wg = WaitGroup::new();

        for cell in self.zones.iter_mut().flat_map(Zone::cells_mut) {
            if !cell.has_pending_work() {
                continue;
            }

            let pending = cell.pending_work().clone();
            let commit = cell.commit();
            let token = wg.clone();
            let sink = Arc::clone(&rejected);

            let submitted = self.work_pool.submit(async move {
                let failed = commit.await;
                if !failed.is_empty() {
                    let mut sink = sink.lock();
                    sink.lrps.extend(failed.lrps);
                    sink.tasks.extend(failed.tasks);
                }
                drop(token);
            });

            if let Err(err) = submitted {
                error!(cell_guid = %cell.guid(), error = %err, "failed to submit commit");
                let mut sink = rejected.lock();
                sink.lrps.extend(pending.lrps);
                sink.tasks.extend(pending.tasks);
            }
        }

        wg.wait();
        // The guard must drop before `rejected` does.
        #[allow(clippy::let_and_return)]
        let rejected_work = std::mem::take(&mut *rejected.lock());
        rejected_work
    }

    /// Bump attempts on every auction and stamp wait durations on successes.
    fn mark_results(&self, mut results: AuctionResults) -> AuctionResults {
        let now = self.clock.now();

        for auction in &mut results.successful_lrps {
            auction.attempts += 1;
            auction.wait_duration = now.saturating_duration_since(auction.queue_time);
        }
        for auction in &mut results.successful_tasks {
            auction.attempts += 1;
            auction.wait_duration = now.saturating_duration_since(auction.queue_time);
        }
        for auction in &mut results.failed_lrps {
            auction.attempts += 1;
        }
        for auction in &mut results.failed_tasks {
            auction.attempts += 1;
        }

        results
    }
}

/// Score every eligible cell, emptiest zone first.
///
/// The scan moves on to the next zone only while no winner exists or the
/// next zone ties the current one's instance count. With no score at all,
/// the error lists the resource kinds every attempted cell was short on.
fn run_auction<F>(zones: &[Zone], candidates: &[ZoneCandidates], mut score: F) -> Result<CellRef, PlacementError>
where
    F: FnMut(&Cell) -> Result<f64, PlacementError>,
{
    let mut winner: Option<(CellRef, f64)> = None;
    let mut problems = ResourceProblems::all();

    for (i, candidate) in candidates.iter().enumerate() {
        let cells = zones[candidate.zone].cells();
        for &index in &candidate.cells {
            match score(&cells[index]) {
                Ok(value) => {
                    if winner.is_none_or(|(_, best)| value < best) {
                        winner = Some((
                            CellRef {
                                zone: candidate.zone,
                                cell: index,
                            },
                            value,
                        ));
                    }
                }
                Err(PlacementError::InsufficientResources(cell_problems)) => {
                    problems.retain_common(&cell_problems);
                }
                Err(err) => {
                    warn!(cell_guid = %cells[index].guid(), error = %err, "unexpected scoring error");
                }
            }
        }

        let next_ties = candidates
            .get(i + 1)
            .is_some_and(|next| next.instances == candidate.instances);
        if winner.is_some() && !next_ties {
            break;
        }
    }

    winner
        .map(|(cell, _)| cell)
        .ok_or(PlacementError::InsufficientResources(problems))
}

/// Index ascending, then memory descending, then identity.
fn sort_lrp_auctions(lrps: &mut [LrpAuction]) {
    lrps.sort_by(|a, b| {
        a.lrp
            .key
            .index
            .cmp(&b.lrp.key.index)
            .then_with(|| b.lrp.resource.memory_mb.cmp(&a.lrp.resource.memory_mb))
            .then_with(|| a.lrp.key.process_guid.cmp(&b.lrp.key.process_guid))
    });
}

/// Memory descending, then identity.
fn sort_task_auctions(tasks: &mut [TaskAuction]) {
    tasks.sort_by(|a, b| {
        b.task
            .resource
            .memory_mb
            .cmp(&a.task.resource.memory_mb)
            .then_with(|| a.task.task_guid.cmp(&b.task.task_guid))
    });
}

/// First instances (index 0) and replicas, each keeping the given order.
fn split_lrps(lrps: Vec<LrpAuction>) -> (Vec<LrpAuction>, Vec<LrpAuction>) {
    lrps.into_iter().partition(|auction| auction.lrp.key.index == 0)
}

fn fail_all(request: AuctionRequest, err: &PlacementError) -> AuctionResults {
    let message = err.to_string();
    AuctionResults {
        failed_lrps: request
            .lrps
            .into_iter()
            .map(|mut auction| {
                auction.placement_error.clone_from(&message);
                auction
            })
            .collect(),
        failed_tasks: request
            .tasks
            .into_iter()
            .map(|mut auction| {
                auction.placement_error.clone_from(&message);
                auction
            })
            .collect(),
        ..AuctionResults::default()
    }
}

/// Move successes the cells rejected at commit into the failed lists.
fn demote_rejected(results: &mut AuctionResults, rejected: &Work) {
    if rejected.is_empty() {
        return;
    }
    let message = PlacementError::CommitRejected.to_string();

    let lrp_keys: HashSet<String> = rejected.lrps.iter().map(|lrp| lrp.key.to_string()).collect();
    let (failed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut results.successful_lrps)
        .into_iter()
        .partition(|auction| lrp_keys.contains(&auction.identifier()));
    results.successful_lrps = kept;
    for mut auction in failed {
        warn!(lrp_guid = %auction.lrp.key, cell_guid = %auction.winner, "cell rejected lrp at commit");
        auction.winner.clear();
        auction.placement_error.clone_from(&message);
        results.failed_lrps.push(auction);
    }

    let task_guids: HashSet<&str> = rejected.tasks.iter().map(|task| task.task_guid.as_str()).collect();
    let (failed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut results.successful_tasks)
        .into_iter()
        .partition(|auction| task_guids.contains(auction.task.task_guid.as_str()));
    results.successful_tasks = kept;
    for mut auction in failed {
        warn!(task_guid = %auction.task.task_guid, cell_guid = %auction.winner, "cell rejected task at commit");
        auction.winner.clear();
        auction.placement_error.clone_from(&message);
        results.failed_tasks.push(auction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        CellState, CommitError, Lrp, LrpKey, PlacementConstraint, Resource, Resources, Task, WorkCommitter,
    };
    use async_trait::async_trait;
    use std::time::Instant;

    struct NoopCommitter;

    #[async_trait]
    impl WorkCommitter for NoopCommitter {
        async fn perform(&self, _cell_guid: &str, _work: &Work) -> Result<Work, CommitError> {
            Ok(Work::default())
        }
    }

    fn cell(guid: &str) -> Cell {
        Cell::new(guid, Arc::new(NoopCommitter), CellState::new("z", Resources::new(100, 100, 10)))
    }

    fn lrp(guid: &str, index: u32, memory: u64) -> LrpAuction {
        LrpAuction::new(
            Lrp::new(
                LrpKey::new(guid, index),
                "domain",
                Resource::new(memory, 1),
                PlacementConstraint::new("preloaded:linux"),
            ),
            Instant::now(),
        )
    }

    fn task(guid: &str, memory: u64) -> TaskAuction {
        TaskAuction::new(
            Task::new(guid, "domain", Resource::new(memory, 1), PlacementConstraint::new("preloaded:linux")),
            Instant::now(),
        )
    }

    fn candidates(instances: &[usize]) -> Vec<ZoneCandidates> {
        instances
            .iter()
            .enumerate()
            .map(|(zone, &instances)| ZoneCandidates {
                zone,
                cells: vec![0],
                instances,
            })
            .collect()
    }

    fn scores<'a>(table: &'a [(&'a str, f64)]) -> impl FnMut(&Cell) -> Result<f64, PlacementError> + 'a {
        move |cell| {
            table
                .iter()
                .find(|(guid, _)| *guid == cell.guid())
                .map(|(_, score)| *score)
                .ok_or_else(|| {
                    PlacementError::InsufficientResources(
                        [crate::core::ResourceKind::Memory].into_iter().collect(),
                    )
                })
        }
    }

    #[test]
    fn lrps_sort_by_index_then_memory_then_identity() {
        let mut lrps = vec![lrp("b", 1, 10), lrp("a", 0, 10), lrp("c", 0, 50), lrp("b", 0, 10)];
        sort_lrp_auctions(&mut lrps);
        let order: Vec<String> = lrps.iter().map(LrpAuction::identifier).collect();
        assert_eq!(order, vec!["c.0", "a.0", "b.0", "b.1"]);
    }

    #[test]
    fn tasks_sort_by_memory_then_identity() {
        let mut tasks = vec![task("b", 10), task("a", 10), task("c", 30)];
        sort_task_auctions(&mut tasks);
        let order: Vec<String> = tasks.iter().map(TaskAuction::identifier).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn split_separates_first_instances() {
        let (first, replicas) = split_lrps(vec![lrp("a", 0, 1), lrp("a", 1, 1), lrp("b", 0, 1)]);
        assert_eq!(first.len(), 2);
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].identifier(), "a.1");
    }

    #[test]
    fn auction_stops_at_first_non_tied_zone_with_a_winner() {
        let zones = vec![
            Zone::new("a", vec![cell("a")]),
            Zone::new("b", vec![cell("b")]),
        ];
        let table = [("a", 0.5), ("b", 0.1)];
        let winner = run_auction(&zones, &candidates(&[0, 1]), scores(&table)).unwrap();
        assert_eq!(winner, CellRef { zone: 0, cell: 0 });
    }

    #[test]
    fn auction_compares_tied_zones() {
        let zones = vec![
            Zone::new("a", vec![cell("a")]),
            Zone::new("b", vec![cell("b")]),
            Zone::new("c", vec![cell("c")]),
        ];
        let table = [("a", 0.5), ("b", 0.1), ("c", 0.0)];
        let winner = run_auction(&zones, &candidates(&[0, 0, 1]), scores(&table)).unwrap();
        assert_eq!(winner, CellRef { zone: 1, cell: 0 });
    }

    #[test]
    fn auction_keeps_scanning_until_some_cell_scores() {
        let zones = vec![
            Zone::new("a", vec![cell("a")]),
            Zone::new("b", vec![cell("b")]),
        ];
        let table = [("b", 0.9)];
        let winner = run_auction(&zones, &candidates(&[0, 3]), scores(&table)).unwrap();
        assert_eq!(winner, CellRef { zone: 1, cell: 0 });
    }

    #[test]
    fn auction_without_scores_reports_common_problems() {
        let zones = vec![Zone::new("a", vec![cell("a")])];
        let err = run_auction(&zones, &candidates(&[0]), scores(&[])).unwrap_err();
        assert_eq!(err.to_string(), "insufficient resources: memory");
    }

    #[test]
    fn demotion_moves_rejected_items() {
        let mut placed = lrp("a", 0, 1);
        placed.winner = "cell".into();
        let mut results = AuctionResults {
            successful_lrps: vec![placed.clone(), lrp("b", 0, 1)],
            ..AuctionResults::default()
        };
        let rejected = Work {
            lrps: vec![placed.lrp],
            tasks: Vec::new(),
        };

        demote_rejected(&mut results, &rejected);

        assert_eq!(results.successful_lrps.len(), 1);
        assert_eq!(results.failed_lrps.len(), 1);
        assert!(results.failed_lrps[0].winner.is_empty());
        assert_eq!(results.failed_lrps[0].placement_error, "cell rejected the work at commit");
    }
}
