//! Configuration for tablet-state components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `TABLET_STATE_SCAN_BATCH_SIZE=500`
pub const ENV_PREFIX: &str = "TABLET_STATE";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory of the local RocksDB backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Coordination node holding the root tablet's location
    #[serde(default = "default_root_node_path")]
    pub root_node_path: String,

    /// Rows fetched per round trip while scanning the metadata table
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Caller-side timeout for a single store operation
    #[serde(default = "default_op_timeout")]
    pub op_timeout_ms: u64,

    /// Retries for `StoreUnavailable` before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First backoff delay, doubled after every failed attempt
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tablet-state")
}
fn default_root_node_path() -> String {
    "/tablet-state/root_tablet".to_string()
}
fn default_scan_batch_size() -> usize {
    1000
}
fn default_op_timeout() -> u64 {
    5000
}
fn default_max_retries() -> usize {
    5
}
fn default_initial_backoff() -> u64 {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            root_node_path: default_root_node_path(),
            scan_batch_size: default_scan_batch_size(),
            op_timeout_ms: default_op_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then the environment.
    ///
    /// Environment variables take priority over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder =
            builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "scan_batch_size must be positive".into(),
            ));
        }
        if !self.root_node_path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "root_node_path must be absolute: {}",
                self.root_node_path
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries must be positive".into()));
        }
        Ok(())
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan_batch_size, 1000);
        assert_eq!(config.op_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "scan_batch_size = 7").unwrap();
        writeln!(file, "root_node_path = \"/cluster-a/root_tablet\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.scan_batch_size, 7);
        assert_eq!(config.root_node_path, "/cluster-a/root_tablet");
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            scan_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            root_node_path: "relative".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
