//! Coordination nodes persisted in a RocksDB column family

use crate::common::{Error, Result};
use crate::coordination::{CoordinationService, Version};
use rocksdb::DB;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub const CF_COORD: &str = "coord";

#[derive(Serialize, Deserialize)]
struct Node {
    version: Version,
    data: Vec<u8>,
}

/// Single-process coordination backend for a local state directory.
///
/// RocksDB has no compare-and-set, so every read-check-write runs under one
/// mutex. RocksDB's own directory lock keeps other processes out.
pub struct RocksCoordination {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl RocksCoordination {
    /// `db` must have been opened with the `coord` column family.
    pub fn new(db: Arc<DB>) -> Result<Self> {
        if db.cf_handle(CF_COORD).is_none() {
            return Err(Error::StoreUnavailable(format!(
                "column family {} missing",
                CF_COORD
            )));
        }
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn get_node(&self, path: &str) -> Result<Option<Node>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, path.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_node(&self, path: &str, node: &Node) -> Result<()> {
        let cf = self.cf()?;
        let value = bincode::serialize(node)?;
        self.db.put_cf(cf, path.as_bytes(), value)?;
        Ok(())
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_COORD)
            .ok_or_else(|| Error::StoreUnavailable(format!("column family {} missing", CF_COORD)))
    }
}

impl CoordinationService for RocksCoordination {
    fn read(&self, path: &str) -> Result<Option<(Vec<u8>, Version)>> {
        Ok(self.get_node(path)?.map(|node| (node.data, node.version)))
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<Option<Version>> {
        let _guard = self.write_lock.lock()?;
        if self.get_node(path)?.is_some() {
            return Ok(None);
        }
        self.put_node(
            path,
            &Node {
                version: 0,
                data: data.to_vec(),
            },
        )?;
        Ok(Some(0))
    }

    fn compare_and_set(
        &self,
        path: &str,
        data: &[u8],
        expected: Version,
    ) -> Result<Option<Version>> {
        let _guard = self.write_lock.lock()?;
        match self.get_node(path)? {
            Some(node) if node.version == expected => {
                let version = expected + 1;
                self.put_node(
                    path,
                    &Node {
                        version,
                        data: data.to_vec(),
                    },
                )?;
                Ok(Some(version))
            }
            _ => Ok(None),
        }
    }

    fn delete(&self, path: &str, expected: Version) -> Result<bool> {
        let _guard = self.write_lock.lock()?;
        match self.get_node(path)? {
            Some(node) if node.version == expected => {
                self.db.delete_cf(self.cf()?, path.as_bytes())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
