//! Value types of the assignment bookkeeping

pub mod assignment;
pub mod extent;
pub mod location;
pub mod session;

pub use assignment::Assignment;
pub use extent::{KeyExtent, TableId, METADATA_TABLE_ID};
pub use location::{LocationState, Locations, TabletState, Transition};
pub use session::ServerSession;
