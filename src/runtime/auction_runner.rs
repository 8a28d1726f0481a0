//! Long-lived loop turning queued requests into scheduling passes.
//!
//! The runner waits for the batch's work signal, drains it, polls the cells,
//! runs one [`Scheduler`] pass, resubmits retryable failures, and reports the
//! rest to its [`AuctionRunnerDelegate`]. It runs on its own thread with a
//! private current-thread tokio runtime for the fetch calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::{after, bounded, select, Receiver, Sender};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::AuctioneerConfig;
use crate::core::zone::build_zones;
use crate::core::{
    AuctionRequest, AuctionResults, CellAddress, CellState, CellStateSource, FetchError, LrpStartRequest,
    Scheduler, SchedulerSettings, Task, WorkCommitter, WorkPool,
};
use crate::runtime::Batch;
use crate::util::Clock;

/// Hooks the runner calls out to around each pass.
#[async_trait]
pub trait AuctionRunnerDelegate: Send + Sync + 'static {
    /// Addresses of every cell currently registered.
    ///
    /// # Errors
    ///
    /// [`FetchError`] when discovery is unavailable; the cycle is retried
    /// after a pause.
    async fn fetch_cell_addresses(&self) -> Result<Vec<CellAddress>, FetchError>;

    /// Results of a pass: all successes plus failures that ran out of retries.
    fn auction_completed(&self, results: AuctionResults);
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was queued.
    Idle,
    /// Cell discovery failed; the drained work was put back.
    FetchFailed,
    /// A pass ran.
    Completed(CycleSummary),
}

/// Counts from a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Cells that answered the state poll.
    pub cells: usize,
    /// Auctions placed.
    pub successful: usize,
    /// Auctions reported as permanently failed.
    pub failed: usize,
    /// Auctions put back for another pass.
    pub resubmitted: usize,
}

/// Drives scheduling passes from a [`Batch`].
pub struct AuctionRunner {
    delegate: Arc<dyn AuctionRunnerDelegate>,
    state_source: Arc<dyn CellStateSource>,
    committer: Arc<dyn WorkCommitter>,
    work_pool: Arc<WorkPool>,
    clock: Arc<dyn Clock>,
    batch: Arc<Batch>,
    settings: SchedulerSettings,
    max_retries: u32,
    fetch_retry_pause: Duration,
}

impl std::fmt::Debug for AuctionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuctionRunner")
            .field("batch", &self.batch)
            .field("settings", &self.settings)
            .field("max_retries", &self.max_retries)
            .field("fetch_retry_pause", &self.fetch_retry_pause)
            .finish_non_exhaustive()
    }
}

impl AuctionRunner {
    /// Assemble a runner from its collaborators and `config`.
    pub fn new(
        delegate: Arc<dyn AuctionRunnerDelegate>,
        state_source: Arc<dyn CellStateSource>,
        committer: Arc<dyn WorkCommitter>,
        work_pool: Arc<WorkPool>,
        clock: Arc<dyn Clock>,
        config: &AuctioneerConfig,
    ) -> Self {
        let batch = Arc::new(Batch::new(Arc::clone(&clock)));
        Self {
            delegate,
            state_source,
            committer,
            work_pool,
            clock,
            batch,
            settings: config.scheduler_settings(),
            max_retries: config.max_retries,
            fetch_retry_pause: Duration::from_millis(config.fetch_retry_pause_ms),
        }
    }

    /// Shared handle to the pending batch.
    #[must_use]
    pub fn batch(&self) -> Arc<Batch> {
        Arc::clone(&self.batch)
    }

    /// Queue LRP starts for the next pass.
    pub fn add_lrp_starts(&self, starts: &[LrpStartRequest]) {
        self.batch.add_lrp_starts(starts);
    }

    /// Queue tasks for the next pass.
    pub fn add_tasks(&self, tasks: Vec<Task>) {
        self.batch.add_tasks(tasks);
    }

    /// Run one drain, fetch, schedule, and report cycle.
    pub fn run_cycle(&self, rt: &tokio::runtime::Runtime) -> CycleOutcome {
        let span = info_span!("auction_cycle", cycle_id = %Uuid::new_v4());
        let _guard = span.enter();

        let mut request = self.batch.dedupe_and_drain();
        if request.is_empty() {
            debug!("nothing to auction");
            return CycleOutcome::Idle;
        }

        let states = match rt.block_on(self.fetch_states()) {
            Ok(states) => states,
            Err(err) => {
                error!(error = %err, "failed to fetch cell states");
                self.batch.resubmit(request);
                return CycleOutcome::FetchFailed;
            }
        };

        // Pick up anything queued while the fetch was in flight.
        request.merge(self.batch.dedupe_and_drain());

        let cells = states.len();
        info!(
            cells,
            lrps = request.lrps.len(),
            tasks = request.tasks.len(),
            "scheduling"
        );

        let zones = build_zones(states, &self.committer);
        let mut scheduler = Scheduler::new(
            Arc::clone(&self.work_pool),
            zones,
            Arc::clone(&self.clock),
            self.settings,
        );
        let results = scheduler.schedule(request);

        let (results, retry) = resubmit_failed_auctions(results, self.max_retries);
        let summary = CycleSummary {
            cells,
            successful: results.successful_lrps.len() + results.successful_tasks.len(),
            failed: results.failed_lrps.len() + results.failed_tasks.len(),
            resubmitted: retry.lrps.len() + retry.tasks.len(),
        };
        if summary.resubmitted > 0 {
            debug!(resubmitted = summary.resubmitted, "resubmitting failed auctions");
            self.batch.resubmit(retry);
        }
        if summary.failed > 0 {
            warn!(failed = summary.failed, "auctions failed after exhausting retries");
        }

        self.delegate.auction_completed(results);
        CycleOutcome::Completed(summary)
    }

    async fn fetch_states(&self) -> Result<HashMap<String, CellState>, FetchError> {
        let addresses = self.delegate.fetch_cell_addresses().await?;
        Ok(self.state_source.fetch_states(&addresses).await)
    }

    /// Loop until `shutdown` fires or its sender is dropped.
    ///
    /// # Errors
    ///
    /// Fails only if the runner's tokio runtime cannot be built.
    pub fn run(&self, shutdown: &Receiver<()>) -> std::io::Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        info!("auction runner started");

        loop {
            let stop = select! {
                recv(self.batch.has_work()) -> _ => false,
                recv(shutdown) -> _ => true,
            };
            if stop {
                break;
            }

            if self.run_cycle(&rt) == CycleOutcome::FetchFailed {
                let stop = select! {
                    recv(after(self.fetch_retry_pause)) -> _ => false,
                    recv(shutdown) -> _ => true,
                };
                if stop {
                    break;
                }
                self.batch.signal();
            }
        }

        info!("auction runner stopped");
        Ok(())
    }

    /// Run the loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<RunnerHandle> {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let batch = self.batch();
        let thread = thread::Builder::new()
            .name("auction-runner".into())
            .spawn(move || {
                if let Err(err) = self.run(&shutdown_rx) {
                    error!(error = %err, "auction runner failed to start");
                }
            })?;

        Ok(RunnerHandle {
            batch,
            shutdown_tx,
            thread,
        })
    }
}

/// Handle to a runner started with [`AuctionRunner::spawn`].
#[derive(Debug)]
pub struct RunnerHandle {
    batch: Arc<Batch>,
    shutdown_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl RunnerHandle {
    /// The runner's pending batch.
    #[must_use]
    pub const fn batch(&self) -> &Arc<Batch> {
        &self.batch
    }

    /// Stop the loop after the current cycle and wait for the thread.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.try_send(());
        if self.thread.join().is_err() {
            warn!("auction runner thread panicked");
        }
    }
}

/// Split failures into those worth another pass and those out of retries.
///
/// An auction is retried while its attempt count does not exceed
/// `max_retries`. The returned results keep every success plus the
/// permanent failures.
#[must_use]
pub fn resubmit_failed_auctions(mut results: AuctionResults, max_retries: u32) -> (AuctionResults, AuctionRequest) {
    let (lrps, failed_lrps): (Vec<_>, Vec<_>) = std::mem::take(&mut results.failed_lrps)
        .into_iter()
        .partition(|auction| auction.attempts <= max_retries);
    let (tasks, failed_tasks): (Vec<_>, Vec<_>) = std::mem::take(&mut results.failed_tasks)
        .into_iter()
        .partition(|auction| auction.attempts <= max_retries);

    results.failed_lrps = failed_lrps;
    results.failed_tasks = failed_tasks;
    (results, AuctionRequest { lrps, tasks })
}
