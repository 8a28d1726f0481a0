//! Collaborator traits for talking to cells.
//!
//! The scheduler never speaks a wire protocol itself. State polling and work
//! submission are delegated to implementations of these traits, which own
//! their transport, timeouts, and retries.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{CellState, CommitError, Work};

/// Where to reach a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellAddress {
    /// Cell identifier.
    pub cell_guid: String,
    /// Transport address (URL, subject, ...), opaque to the scheduler.
    pub address: String,
}

impl CellAddress {
    /// Create an address entry.
    #[must_use]
    pub fn new(cell_guid: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            cell_guid: cell_guid.into(),
            address: address.into(),
        }
    }
}

/// Polls cells for their current state.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use cell_auction::core::{CellAddress, CellState, CellStateSource};
///
/// struct HttpStateSource { client: reqwest::Client }
///
/// #[async_trait]
/// impl CellStateSource for HttpStateSource {
///     async fn fetch_states(&self, cells: &[CellAddress]) -> HashMap<String, CellState> {
///         // one GET /state per cell, skipping cells that fail or time out
///     }
/// }
/// ```
#[async_trait]
pub trait CellStateSource: Send + Sync + 'static {
    /// Fetch a snapshot from every reachable cell, keyed by cell id.
    ///
    /// Cells that fail to answer are simply absent from the result; fewer
    /// entries than requested is not an error.
    async fn fetch_states(&self, cells: &[CellAddress]) -> HashMap<String, CellState>;
}

/// Applies reserved work on a cell.
#[async_trait]
pub trait WorkCommitter: Send + Sync + 'static {
    /// Ask `cell_guid` to start `work`. Returns the subset the cell could not
    /// apply.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitError`] when the call as a whole failed and the
    /// outcome on the cell is unknown.
    async fn perform(&self, cell_guid: &str, work: &Work) -> Result<Work, CommitError>;
}
