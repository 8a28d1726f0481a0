//! A cell's ledger for one scheduling pass.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error};

use crate::core::{CellState, Lrp, PlacementConstraint, PlacementError, Task, Work, WorkCommitter};

/// Future returned by [`Cell::commit`], resolving to the work the cell rejected.
pub type CommitFuture = Pin<Box<dyn Future<Output = Work> + Send + 'static>>;

/// Resource ledger of one cell plus the handle used to apply work on it.
///
/// Built fresh from a polled [`CellState`] each pass. Reservations mutate the
/// in-memory state and buffer work locally; nothing reaches the cell until
/// [`Cell::commit`].
pub struct Cell {
    guid: String,
    committer: Arc<dyn WorkCommitter>,
    state: CellState,
    work_to_commit: Work,
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("guid", &self.guid)
            .field("state", &self.state)
            .field("work_to_commit", &self.work_to_commit)
            .finish_non_exhaustive()
    }
}

impl Cell {
    /// Wrap a polled snapshot.
    pub fn new(guid: impl Into<String>, committer: Arc<dyn WorkCommitter>, state: CellState) -> Self {
        Self {
            guid: guid.into(),
            committer,
            state,
            work_to_commit: Work::default(),
        }
    }

    /// Cell identifier.
    #[must_use]
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Current in-memory state, including reservations made this pass.
    #[must_use]
    pub const fn state(&self) -> &CellState {
        &self.state
    }

    /// Containers the cell reported as starting.
    #[must_use]
    pub const fn starting_container_count(&self) -> u32 {
        self.state.starting_container_count
    }

    /// Work reserved but not yet committed.
    #[must_use]
    pub const fn pending_work(&self) -> &Work {
        &self.work_to_commit
    }

    /// Whether anything is waiting to be committed.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.work_to_commit.is_empty()
    }

    /// Root filesystem predicate.
    #[must_use]
    pub fn match_rootfs(&self, constraint: &PlacementConstraint) -> bool {
        self.state.match_rootfs(&constraint.rootfs)
    }

    /// Volume driver predicate.
    #[must_use]
    pub fn match_volume_drivers(&self, constraint: &PlacementConstraint) -> bool {
        self.state.match_volume_drivers(&constraint.volume_drivers)
    }

    /// Placement tag predicate.
    #[must_use]
    pub fn match_placement_tags(&self, constraint: &PlacementConstraint) -> bool {
        self.state.match_placement_tags(&constraint.placement_tags)
    }

    /// Speculatively claim resources for `lrp`.
    ///
    /// # Errors
    ///
    /// [`PlacementError::InsufficientResources`] naming every dimension that
    /// does not fit.
    pub fn reserve_lrp(&mut self, lrp: &Lrp) -> Result<(), PlacementError> {
        self.state
            .resource_match(&lrp.resource)
            .map_err(PlacementError::InsufficientResources)?;

        self.state.add_lrp(lrp);
        self.work_to_commit.lrps.push(lrp.clone());
        Ok(())
    }

    /// Speculatively claim resources for `task`.
    ///
    /// # Errors
    ///
    /// [`PlacementError::InsufficientResources`] naming every dimension that
    /// does not fit.
    pub fn reserve_task(&mut self, task: &Task) -> Result<(), PlacementError> {
        self.state
            .resource_match(&task.resource)
            .map_err(PlacementError::InsufficientResources)?;

        self.state.add_task(task);
        self.work_to_commit.tasks.push(task.clone());
        Ok(())
    }

    /// Flush the pending buffer to the cell.
    ///
    /// The buffer is taken synchronously; the returned future performs the
    /// remote call and yields whatever the cell rejected. With nothing
    /// pending it resolves to empty work without contacting the cell.
    ///
    /// A transport error also yields empty work: the outcome on the cell is
    /// unknown, and rescheduling could duplicate instances, so reconciliation
    /// is left to the convergence process.
    pub fn commit(&mut self) -> CommitFuture {
        if self.work_to_commit.is_empty() {
            return Box::pin(std::future::ready(Work::default()));
        }

        let work = std::mem::take(&mut self.work_to_commit);
        let committer = Arc::clone(&self.committer);
        let guid = self.guid.clone();

        Box::pin(async move {
            debug!(
                cell_guid = %guid,
                lrps = work.lrps.len(),
                tasks = work.tasks.len(),
                "committing work"
            );
            match committer.perform(&guid, &work).await {
                Ok(failed) => failed,
                Err(err) => {
                    error!(cell_guid = %guid, error = %err, "failed to commit");
                    Work::default()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CommitError, LrpKey, Resource, Resources, RootFsProvider};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Committer that records calls and replays a canned response.
    struct RecordingCommitter {
        calls: Mutex<Vec<(String, Work)>>,
        response: Mutex<Option<Result<Work, CommitError>>>,
    }

    impl RecordingCommitter {
        fn new(response: Result<Work, CommitError>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response: Mutex::new(Some(response)),
            })
        }
    }

    #[async_trait]
    impl WorkCommitter for RecordingCommitter {
        async fn perform(&self, cell_guid: &str, work: &Work) -> Result<Work, CommitError> {
            self.calls.lock().push((cell_guid.to_string(), work.clone()));
            self.response.lock().take().unwrap_or_else(|| Ok(Work::default()))
        }
    }

    fn state() -> CellState {
        CellState::new("z1", Resources::new(100, 200, 50)).with_rootfs_provider(
            "preloaded",
            RootFsProvider::Fixed(["linux".to_string()].into_iter().collect()),
        )
    }

    fn lrp(guid: &str, memory: u64, disk: u64) -> Lrp {
        Lrp::new(
            LrpKey::new(guid, 0),
            "domain",
            Resource::new(memory, disk),
            PlacementConstraint::new("preloaded:linux"),
        )
    }

    fn task(guid: &str, memory: u64, disk: u64) -> Task {
        Task::new(
            guid,
            "domain",
            Resource::new(memory, disk),
            PlacementConstraint::new("preloaded:linux"),
        )
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn reserve_lrp_claims_resources_and_buffers_work() {
        let mut cell = Cell::new("cell", RecordingCommitter::new(Ok(Work::default())), state());
        cell.reserve_lrp(&lrp("pg", 10, 20)).unwrap();

        assert_eq!(cell.state().available, Resources::new(90, 180, 49));
        assert_eq!(cell.pending_work().lrps.len(), 1);
    }

    #[test]
    fn reserve_task_rejects_every_violated_kind() {
        let mut cell = Cell::new("cell", RecordingCommitter::new(Ok(Work::default())), state());
        let err = cell.reserve_task(&task("t", 1000, 1000)).unwrap_err();

        assert_eq!(err.to_string(), "insufficient resources: disk, memory");
        assert!(!cell.has_pending_work());
        assert_eq!(cell.state().available, Resources::new(100, 200, 50));
    }

    #[test]
    fn commit_with_nothing_reserved_skips_the_cell() {
        let committer = RecordingCommitter::new(Ok(Work::default()));
        let mut cell = Cell::new("cell", committer.clone(), state());

        assert!(block_on(cell.commit()).is_empty());
        assert!(committer.calls.lock().is_empty());
    }

    #[test]
    fn commit_forwards_failed_work() {
        let failed = Work {
            lrps: vec![lrp("pg", 10, 20)],
            tasks: Vec::new(),
        };
        let committer = RecordingCommitter::new(Ok(failed.clone()));
        let mut cell = Cell::new("cell", committer.clone(), state());
        cell.reserve_lrp(&lrp("pg", 10, 20)).unwrap();
        cell.reserve_task(&task("t", 10, 20)).unwrap();

        assert_eq!(block_on(cell.commit()), failed);
        let calls = committer.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "cell");
        assert_eq!(calls[0].1.lrps.len(), 1);
        assert_eq!(calls[0].1.tasks.len(), 1);
        assert!(!cell.has_pending_work());
    }

    #[test]
    fn commit_transport_error_returns_no_failed_work() {
        let committer = RecordingCommitter::new(Err(CommitError::Transport("boom".into())));
        let mut cell = Cell::new("cell", committer.clone(), state());
        cell.reserve_lrp(&lrp("pg", 10, 20)).unwrap();

        assert!(block_on(cell.commit()).is_empty());
        assert_eq!(committer.calls.lock().len(), 1);
    }
}
