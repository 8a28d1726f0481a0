//! Shared fakes and builders for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cell_auction::config::WorkPoolConfig;
use cell_auction::core::{
    AuctionResults, CellAddress, CellState, CellStateSource, CommitError, FetchError, Lrp, LrpAuction,
    LrpKey, LrpStartRequest, PlacementConstraint, Resource, Resources, RootFsProvider, Task, TaskAuction,
    Work, WorkCommitter, WorkPool,
};
use cell_auction::runtime::AuctionRunnerDelegate;
use cell_auction::util::Clock;
use crossbeam_channel::Sender;
use parking_lot::Mutex;

pub const LINUX: &str = "preloaded:linux";

// ============================================================================
// CLOCK
// ============================================================================

/// Clock that only moves when told to.
pub struct FakeClock {
    now: Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

// ============================================================================
// COMMITTER
// ============================================================================

/// Records every commit and answers per cell.
#[derive(Default)]
pub struct FakeCommitter {
    calls: Mutex<Vec<(String, Work)>>,
    reject_all: Mutex<HashSet<String>>,
    fail_transport: Mutex<HashSet<String>>,
}

impl FakeCommitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The cell reports every item it receives as failed.
    pub fn reject_everything_on(&self, cell_guid: &str) {
        self.reject_all.lock().insert(cell_guid.to_string());
    }

    /// The call to the cell fails as a whole.
    pub fn fail_transport_on(&self, cell_guid: &str) {
        self.fail_transport.lock().insert(cell_guid.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, cell_guid: &str) -> Vec<Work> {
        self.calls
            .lock()
            .iter()
            .filter(|(guid, _)| guid == cell_guid)
            .map(|(_, work)| work.clone())
            .collect()
    }
}

#[async_trait]
impl WorkCommitter for FakeCommitter {
    async fn perform(&self, cell_guid: &str, work: &Work) -> Result<Work, CommitError> {
        self.calls.lock().push((cell_guid.to_string(), work.clone()));

        if self.fail_transport.lock().contains(cell_guid) {
            return Err(CommitError::Transport("connection refused".into()));
        }
        if self.reject_all.lock().contains(cell_guid) {
            return Ok(work.clone());
        }
        Ok(Work::default())
    }
}

// ============================================================================
// STATE SOURCE
// ============================================================================

/// Serves canned snapshots; unknown cells are treated as unreachable.
#[derive(Default)]
pub struct FakeStateSource {
    states: Mutex<HashMap<String, CellState>>,
}

impl FakeStateSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, cell_guid: &str, state: CellState) {
        self.states.lock().insert(cell_guid.to_string(), state);
    }
}

#[async_trait]
impl CellStateSource for FakeStateSource {
    async fn fetch_states(&self, cells: &[CellAddress]) -> HashMap<String, CellState> {
        let states = self.states.lock();
        cells
            .iter()
            .filter_map(|cell| {
                states
                    .get(&cell.cell_guid)
                    .map(|state| (cell.cell_guid.clone(), state.clone()))
            })
            .collect()
    }
}

// ============================================================================
// RUNNER DELEGATE
// ============================================================================

type FetchHook = Box<dyn FnOnce() + Send>;

/// Delegate with scripted discovery failures and recorded results.
#[derive(Default)]
pub struct FakeDelegate {
    addresses: Mutex<Vec<CellAddress>>,
    failures_left: AtomicUsize,
    on_fetch: Mutex<Option<FetchHook>>,
    completed: Mutex<Vec<AuctionResults>>,
    notify: Mutex<Option<Sender<AuctionResults>>>,
}

impl FakeDelegate {
    pub fn new(cell_guids: &[&str]) -> Arc<Self> {
        let delegate = Self::default();
        *delegate.addresses.lock() = cell_guids
            .iter()
            .map(|guid| CellAddress::new(*guid, format!("http://{guid}.cells.internal")))
            .collect();
        Arc::new(delegate)
    }

    /// Fail the next `count` discovery calls.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Run `hook` once during the next discovery call.
    pub fn on_next_fetch(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_fetch.lock() = Some(Box::new(hook));
    }

    pub fn notify_on_completion(&self, tx: Sender<AuctionResults>) {
        *self.notify.lock() = Some(tx);
    }

    pub fn completed(&self) -> Vec<AuctionResults> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl AuctionRunnerDelegate for FakeDelegate {
    async fn fetch_cell_addresses(&self) -> Result<Vec<CellAddress>, FetchError> {
        if let Some(hook) = self.on_fetch.lock().take() {
            hook();
        }

        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(FetchError::Unavailable("registry offline".into()));
        }
        Ok(self.addresses.lock().clone())
    }

    fn auction_completed(&self, results: AuctionResults) {
        if let Some(tx) = self.notify.lock().as_ref() {
            let _ = tx.send(results.clone());
        }
        self.completed.lock().push(results);
    }
}

// ============================================================================
// BUILDERS
// ============================================================================

pub fn work_pool() -> Arc<WorkPool> {
    Arc::new(WorkPool::new(WorkPoolConfig::new().with_worker_count(2).with_max_queue_depth(16)).unwrap())
}

/// Linux cell in `zone` with the given capacity.
pub fn linux_cell(zone: &str, memory_mb: u64, disk_mb: u64, containers: u32) -> CellState {
    CellState::new(zone, Resources::new(memory_mb, disk_mb, containers)).with_rootfs_provider(
        "preloaded",
        RootFsProvider::Fixed(["linux".to_string()].into_iter().collect()),
    )
}

/// The 100 memory / 200 disk / 50 container cell used throughout.
pub fn standard_cell(zone: &str) -> CellState {
    linux_cell(zone, 100, 200, 50)
}

pub fn lrp(process_guid: &str, index: u32, memory_mb: u64, disk_mb: u64) -> Lrp {
    Lrp::new(
        LrpKey::new(process_guid, index),
        "domain",
        Resource::new(memory_mb, disk_mb),
        PlacementConstraint::new(LINUX),
    )
}

pub fn lrp_auction(process_guid: &str, index: u32, memory_mb: u64, disk_mb: u64) -> LrpAuction {
    LrpAuction::new(lrp(process_guid, index, memory_mb, disk_mb), Instant::now())
}

pub fn task(task_guid: &str, memory_mb: u64, disk_mb: u64) -> Task {
    Task::new(
        task_guid,
        "domain",
        Resource::new(memory_mb, disk_mb),
        PlacementConstraint::new(LINUX),
    )
}

pub fn task_auction(task_guid: &str, memory_mb: u64, disk_mb: u64) -> TaskAuction {
    TaskAuction::new(task(task_guid, memory_mb, disk_mb), Instant::now())
}

pub fn start_request(process_guid: &str, indices: Vec<u32>, memory_mb: u64, disk_mb: u64) -> LrpStartRequest {
    LrpStartRequest {
        process_guid: process_guid.into(),
        domain: "domain".into(),
        indices,
        resource: Resource::new(memory_mb, disk_mb),
        constraint: PlacementConstraint::new(LINUX),
    }
}
