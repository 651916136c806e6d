//! Common utilities and types shared across tablet-state

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use utils::{parse_duration, retry_with_backoff, with_timeout};
