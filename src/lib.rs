//! # tablet-state
//!
//! Bookkeeping of which tablet server hosts each tablet of a sorted,
//! range-partitioned table store:
//! - A state machine (unassigned → future → current) guarded by conditional writes
//! - A bootstrap store for the root tablet, kept in a coordination service
//! - A recursive store for all other tablets, kept in the metadata table
//! - Per-item results for batched updates, so one conflict never blocks a batch
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   Coordinator / tablet servers (callers) │
//! └───────────┬──────────────────────────────┘
//!             │ scan / set_future_locations / set_locations / unassign
//!   ┌─────────┴──────────────┐
//!   │ dispatch (by extent)   │
//!   └──┬──────────────────┬──┘
//!      │ root tablet      │ every other tablet
//! ┌────▼────────────┐  ┌──▼────────────────────┐
//! │ RootStateStore  │  │ MetadataStateStore    │
//! │ (versioned node,│  │ (metadata table rows, │
//! │  CAS)           │  │  conditional updates) │
//! └────┬────────────┘  └──┬────────────────────┘
//!      │                  │
//! ┌────▼────────────┐  ┌──▼────────────────────┐
//! │ Coordination    │  │ MetadataTable         │
//! │ service         │  │ (served by tablets    │
//! │                 │  │  rooted in the root)  │
//! └─────────────────┘  └───────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! tablet-admin --data ./state init
//! tablet-admin --data ./state register --table 2 --end m
//! tablet-admin --data ./state assign --table 2 --end m --server 'ts1:9997[1]'
//! tablet-admin --data ./state promote --table 2 --end m --server 'ts1:9997[1]'
//! tablet-admin --data ./state verify --live 'ts1:9997[1]'
//! ```

pub mod common;
pub mod coordination;
pub mod local;
pub mod model;
pub mod ops;
pub mod store;
pub mod table;

// Re-export commonly used types
pub use common::{Config, Error, ErrorKind, Result};
pub use local::LocalBackend;
pub use model::{Assignment, KeyExtent, LocationState, ServerSession, TableId, TabletState};
pub use store::{BatchOutcome, MetadataStateStore, RootStateStore, StoreRegistry, TabletStateStore};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
