//! Tablet assignment state stores
//!
//! Two stores implement [`TabletStateStore`]:
//! - [`RootStateStore`]: the root tablet, kept in one coordination node
//! - [`MetadataStateStore`]: every other tablet, kept as metadata table rows
//!
//! [`dispatch`] routes single-tablet calls to the right one.

pub mod dispatch;
pub mod metadata;
pub mod root;

pub use dispatch::{ExtentClass, StoreProvider, StoreRegistry};
pub use metadata::MetadataStateStore;
pub use root::RootStateStore;

use crate::common::Result;
use crate::model::{Assignment, KeyExtent, LocationState};

/// Lazy, finite scan over a store's tablets.
///
/// Each call to `scan()` starts a fresh pass. Elements that fail to decode are
/// returned as `Err` and the scan moves on; a backend failure ends the scan
/// after its error.
pub type LocationScan = Box<dyn Iterator<Item = Result<LocationState>> + Send>;

pub trait TabletStateStore: Send + Sync {
    /// Identifying name for this store
    fn name(&self) -> &str;

    /// Scan the tablets covered by this store
    fn scan(&self) -> LocationScan;

    /// Record where tablets are about to be loaded.
    ///
    /// Fails per item with `Conflict` if the tablet is hosted or already
    /// assigned elsewhere.
    fn set_future_locations(&self, assignments: &[Assignment]) -> BatchOutcome;

    /// Promote future locations to current once servers have loaded the tablets.
    ///
    /// Fails per item with `Conflict` unless the server is the recorded future
    /// location.
    fn set_locations(&self, assignments: &[Assignment]) -> BatchOutcome;

    /// Clear current and future locations, keeping the last location.
    ///
    /// The given states are the caller's view; an item whose locations changed
    /// since is a `Conflict`, an item that is already unassigned succeeds.
    fn unassign(&self, tablets: &[LocationState]) -> BatchOutcome;

    fn set_future_location(&self, assignment: &Assignment) -> Result<()> {
        self.set_future_locations(std::slice::from_ref(assignment))
            .into_result()
    }

    fn set_location(&self, assignment: &Assignment) -> Result<()> {
        self.set_locations(std::slice::from_ref(assignment))
            .into_result()
    }

    fn unassign_one(&self, tablet: &LocationState) -> Result<()> {
        self.unassign(std::slice::from_ref(tablet)).into_result()
    }
}

/// Result of one item of a batch
#[derive(Debug)]
pub struct ItemOutcome {
    pub extent: KeyExtent,
    pub result: Result<()>,
}

/// Per-item results of a batched operation, in input order
#[derive(Debug, Default)]
pub struct BatchOutcome {
    items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, extent: KeyExtent, result: Result<()>) {
        self.items.push(ItemOutcome { extent, result });
    }

    pub fn items(&self) -> &[ItemOutcome] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.items.iter().all(|item| item.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|item| item.result.is_err())
    }

    /// Extents rejected with `Conflict`; the caller should re-scan these.
    pub fn conflicts(&self) -> Vec<&KeyExtent> {
        self.items
            .iter()
            .filter(|item| matches!(&item.result, Err(e) if e.is_conflict()))
            .map(|item| &item.extent)
            .collect()
    }

    pub fn result_for(&self, extent: &KeyExtent) -> Option<&Result<()>> {
        self.items
            .iter()
            .find(|item| &item.extent == extent)
            .map(|item| &item.result)
    }

    /// Collapse into the first error, if any.
    pub fn into_result(self) -> Result<()> {
        self.items
            .into_iter()
            .map(|item| item.result)
            .find(|result| result.is_err())
            .unwrap_or(Ok(()))
    }
}

pub(crate) fn log_result(op: &str, extent: &KeyExtent, result: &Result<()>) {
    match result {
        Ok(()) => tracing::debug!("{} {}: ok", op, extent),
        Err(e) if e.is_conflict() => tracing::warn!("{} {}: {}", op, extent, e),
        Err(e) => tracing::error!("{} {}: {}", op, extent, e),
    }
}
