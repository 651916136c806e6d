//! Error types for tablet-state

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The failure classes a caller of a state store has to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StoreUnavailable,
    Conflict,
    MalformedRecord,
    NoStoreForExtent,
}

#[derive(Error, Debug)]
pub enum Error {
    // === Backing service errors ===
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Operation timed out after {0:?}, outcome unknown")]
    Timeout(Duration),

    // === State machine errors ===
    #[error("Conflict on {extent}: {reason}")]
    Conflict { extent: String, reason: String },

    // === Data errors ===
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    // === Routing errors ===
    #[error("No state store for extent {0}")]
    NoStoreForExtent(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn conflict(extent: impl ToString, reason: impl Into<String>) -> Self {
        Error::Conflict {
            extent: extent.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify this error into one of the contract kinds.
    ///
    /// A timeout is reported as `StoreUnavailable`: the backing service did not
    /// answer in time and the write may or may not have applied.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StoreUnavailable(_) | Error::Timeout(_) => ErrorKind::StoreUnavailable,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::MalformedRecord(_) => ErrorKind::MalformedRecord,
            Error::NoStoreForExtent(_) | Error::InvalidConfig(_) => ErrorKind::NoStoreForExtent,
        }
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::Timeout(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StoreUnavailable(format!("I/O error: {}", e))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::StoreUnavailable(format!("RocksDB error: {}", e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MalformedRecord(format!("bincode: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedRecord(format!("json: {}", e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::StoreUnavailable(format!("lock poisoned: {}", e))
    }
}
