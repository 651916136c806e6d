//! Coordination service holding small versioned records
//!
//! The root tablet's location lives here because it cannot be recorded in the
//! table it roots. Implementations must be linearizable per path.

pub mod memory;
pub mod rocks;

pub use memory::MemCoordination;
pub use rocks::RocksCoordination;

use crate::common::Result;

/// Version of a node, bumped by every successful write
pub type Version = u64;

pub trait CoordinationService: Send + Sync {
    /// Read a node and its version, `None` if it does not exist.
    fn read(&self, path: &str) -> Result<Option<(Vec<u8>, Version)>>;

    /// Create a node. Returns `None` if it already exists.
    fn create(&self, path: &str, data: &[u8]) -> Result<Option<Version>>;

    /// Overwrite a node if its version is still `expected`.
    ///
    /// Returns the new version, or `None` if the node changed or is gone.
    fn compare_and_set(&self, path: &str, data: &[u8], expected: Version)
        -> Result<Option<Version>>;

    /// Delete a node if its version is still `expected`.
    fn delete(&self, path: &str, expected: Version) -> Result<bool>;
}
