//! Pending work accumulated between scheduling passes.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::core::{AuctionRequest, LrpAuction, LrpStartRequest, Task, TaskAuction};
use crate::util::Clock;

/// Thread-safe queue of auctions waiting for the next pass.
///
/// Every addition pulses a capacity-one signal channel, so any number of
/// additions between two passes wakes the runner exactly once.
pub struct Batch {
    pending: Mutex<AuctionRequest>,
    has_work_tx: Sender<()>,
    has_work_rx: Receiver<()>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.pending.lock();
        f.debug_struct("Batch")
            .field("lrps", &pending.lrps.len())
            .field("tasks", &pending.tasks.len())
            .finish_non_exhaustive()
    }
}

impl Batch {
    /// Empty batch stamping enqueue times from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (has_work_tx, has_work_rx) = bounded(1);
        Self {
            pending: Mutex::new(AuctionRequest::default()),
            has_work_tx,
            has_work_rx,
            clock,
        }
    }

    /// Queue one LRP auction per requested index.
    pub fn add_lrp_starts(&self, starts: &[LrpStartRequest]) {
        let now = self.clock.now();
        let auctions: Vec<LrpAuction> = starts
            .iter()
            .flat_map(LrpStartRequest::instances)
            .map(|lrp| LrpAuction::new(lrp, now))
            .collect();
        if auctions.is_empty() {
            return;
        }

        debug!(lrps = auctions.len(), "queued lrp starts");
        self.pending.lock().lrps.extend(auctions);
        self.signal();
    }

    /// Queue one auction per task.
    pub fn add_tasks(&self, tasks: Vec<Task>) {
        if tasks.is_empty() {
            return;
        }
        let now = self.clock.now();

        debug!(tasks = tasks.len(), "queued tasks");
        self.pending
            .lock()
            .tasks
            .extend(tasks.into_iter().map(|task| TaskAuction::new(task, now)));
        self.signal();
    }

    /// Put auctions back as they are, keeping attempts and enqueue times.
    pub fn resubmit(&self, request: AuctionRequest) {
        if request.is_empty() {
            return;
        }

        let mut pending = self.pending.lock();
        pending.lrps.extend(request.lrps);
        pending.tasks.extend(request.tasks);
        drop(pending);
        self.signal();
    }

    /// Wake the runner without adding anything.
    pub fn signal(&self) {
        // A full channel already carries a pending wake-up.
        let _ = self.has_work_tx.try_send(());
    }

    /// Channel that becomes readable when work was added.
    #[must_use]
    pub const fn has_work(&self) -> &Receiver<()> {
        &self.has_work_rx
    }

    /// Take everything queued, dropping repeated identities. The first
    /// occurrence of each identity wins and insertion order is preserved.
    pub fn dedupe_and_drain(&self) -> AuctionRequest {
        let mut request = std::mem::take(&mut *self.pending.lock());
        let before = request.lrps.len() + request.tasks.len();
        request.dedupe();

        let dropped = before - request.lrps.len() - request.tasks.len();
        if dropped > 0 {
            debug!(dropped, "dropped duplicate auctions");
        }
        request
    }

    /// Number of queued auctions, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        let pending = self.pending.lock();
        pending.lrps.len() + pending.tasks.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
