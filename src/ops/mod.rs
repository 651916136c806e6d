//! Ops commands for assignment state maintenance

pub mod verify;

pub use verify::{verify_all, verify_store, VerifyReport};
