//! Local state directory: coordination nodes and metadata rows in one RocksDB
//!
//! Stores:
//! - Coordination nodes (root tablet location)
//! - Metadata table rows (every other tablet)

use crate::common::Result;
use crate::coordination::rocks::CF_COORD;
use crate::coordination::RocksCoordination;
use crate::table::rocks::CF_METADATA;
use crate::table::RocksTable;
use rocksdb::{Options, DB};
use std::path::Path;
use std::sync::Arc;

pub struct LocalBackend {
    db: Arc<DB>,
    coordination: Arc<RocksCoordination>,
    table: Arc<RocksTable>,
}

impl LocalBackend {
    /// Open or create a state directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = Arc::new(DB::open_cf(&opts, path.as_ref(), vec![CF_COORD, CF_METADATA])?);
        tracing::info!("Opened state directory {}", path.as_ref().display());

        Ok(Self {
            coordination: Arc::new(RocksCoordination::new(db.clone())?),
            table: Arc::new(RocksTable::new(db.clone())?),
            db,
        })
    }

    pub fn coordination(&self) -> Arc<RocksCoordination> {
        self.coordination.clone()
    }

    pub fn table(&self) -> Arc<RocksTable> {
        self.table.clone()
    }

    /// Flush both column families to disk
    pub fn flush(&self) -> Result<()> {
        for name in [CF_COORD, CF_METADATA] {
            let cf = self.db.cf_handle(name).ok_or_else(|| {
                crate::Error::StoreUnavailable(format!("column family {} missing", name))
            })?;
            self.db.flush_cf(cf)?;
        }
        Ok(())
    }
}
