//! Metadata rows persisted in a RocksDB column family
//!
//! Each row is one RocksDB entry: the row key maps to the bincode-encoded
//! column map.

use crate::common::{Error, Result};
use crate::table::{
    ConditionalMutation, ConditionalStatus, MetadataTable, Row, RowRange, ScanEntry,
};
use rocksdb::{Direction, IteratorMode, DB};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

pub const CF_METADATA: &str = "metadata";

const LOCK_STRIPES: usize = 64;

pub struct RocksTable {
    db: Arc<DB>,
    /// Row locks for read-check-write, striped by row key hash
    stripes: Vec<Mutex<()>>,
}

impl RocksTable {
    /// `db` must have been opened with the `metadata` column family.
    pub fn new(db: Arc<DB>) -> Result<Self> {
        if db.cf_handle(CF_METADATA).is_none() {
            return Err(Error::StoreUnavailable(format!(
                "column family {} missing",
                CF_METADATA
            )));
        }
        Ok(Self {
            db,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(CF_METADATA).ok_or_else(|| {
            Error::StoreUnavailable(format!("column family {} missing", CF_METADATA))
        })
    }

    fn stripe(&self, key: &[u8]) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % LOCK_STRIPES]
    }

    fn decode(key: &[u8], value: &[u8]) -> Result<Row> {
        let columns: BTreeMap<String, Vec<u8>> = bincode::deserialize(value).map_err(|e| {
            Error::MalformedRecord(format!("row {}: {}", hex::encode(key), e))
        })?;
        Ok(Row {
            key: key.to_vec(),
            columns,
        })
    }
}

impl MetadataTable for RocksTable {
    fn scan_batch(
        &self,
        range: &RowRange,
        resume_after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<ScanEntry>> {
        let cf = self.cf()?;
        let seek = match (resume_after, range.start.as_deref()) {
            (Some(after), Some(start)) if after < start => start,
            (Some(after), _) => after,
            (None, Some(start)) => start,
            (None, None) => &[][..],
        };
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(seek, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if resume_after.map_or(false, |after| &key[..] <= after) {
                continue;
            }
            if !range.contains(&key) {
                break;
            }
            rows.push(ScanEntry {
                row: Self::decode(&key, &value),
                key: key.into_vec(),
            });
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }

    fn read_row(&self, key: &[u8]) -> Result<Option<Row>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(Self::decode(key, &value)?)),
            None => Ok(None),
        }
    }

    fn mutate_row(&self, mutation: &ConditionalMutation) -> Result<ConditionalStatus> {
        let _guard = self.stripe(&mutation.row).lock()?;

        let current = self.read_row(&mutation.row)?;
        if !mutation.conditions_hold(current.as_ref()) {
            return Ok(ConditionalStatus::Rejected);
        }

        let mut columns = current.map(|row| row.columns).unwrap_or_default();
        mutation.apply_to(&mut columns);

        let cf = self.cf()?;
        if columns.is_empty() {
            self.db.delete_cf(cf, &mutation.row)?;
        } else {
            let value = bincode::serialize(&columns)?;
            self.db.put_cf(cf, &mutation.row, value)?;
        }
        Ok(ConditionalStatus::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBackend;
    use tempfile::tempdir;

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = LocalBackend::open(dir.path()).unwrap();
            let table = backend.table();
            for key in ["1;a", "1;m", "1<", "2<"] {
                let m = ConditionalMutation::new(key.as_bytes().to_vec())
                    .require("loc", None)
                    .put("loc", b"s".to_vec());
                assert_eq!(table.mutate_row(&m).unwrap(), ConditionalStatus::Accepted);
            }
        }

        let backend = LocalBackend::open(dir.path()).unwrap();
        let table = backend.table();
        let rows = table
            .scan_batch(&RowRange::table(&crate::model::TableId::new("1")), None, 10)
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![b"1;a".to_vec(), b"1;m".to_vec(), b"1<".to_vec()]);

        let rest = table.scan_batch(&RowRange::all(), Some(b"1;m"), 10).unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_undecodable_row_does_not_end_scan() {
        use crate::model::{KeyExtent, TableId};
        use crate::store::{MetadataStateStore, TabletStateStore};
        use std::collections::HashSet;

        let dir = tempdir().unwrap();
        let backend = LocalBackend::open(dir.path()).unwrap();
        let table = backend.table();
        let store = MetadataStateStore::new(table.clone()).with_batch_size(2);
        let extents: Vec<_> = ["1", "2", "3"]
            .iter()
            .map(|id| KeyExtent::new(TableId::new(*id), None, None).unwrap())
            .collect();
        for e in &extents {
            store.register_tablet(e).unwrap();
        }

        let cf = table.cf().unwrap();
        table.db.put_cf(cf, b"2<", [0xff, 0xff, 0xff]).unwrap();

        let entries = table.scan_batch(&RowRange::all(), None, 10).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].key, b"2<".to_vec());
        assert!(matches!(entries[1].row, Err(Error::MalformedRecord(_))));
        assert!(entries[0].row.is_ok() && entries[2].row.is_ok());

        let results: Vec<_> = store.scan().collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().extent(), &extents[0]);
        assert!(matches!(results[1], Err(Error::MalformedRecord(_))));
        assert_eq!(results[2].as_ref().unwrap().extent(), &extents[2]);

        let report = crate::ops::verify_store(&store, &HashSet::new()).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.malformed.len(), 1);
    }

    #[test]
    fn test_conditional_mutation_rejected() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::open(dir.path()).unwrap();
        let table = backend.table();

        let m = ConditionalMutation::new(b"1<".to_vec())
            .require("future", Some(b"s1".to_vec()))
            .put("loc", b"s1".to_vec());
        assert_eq!(table.mutate_row(&m).unwrap(), ConditionalStatus::Rejected);
        assert!(table.read_row(b"1<").unwrap().is_none());
    }
}
