//! In-memory sorted table

use crate::common::{Error, Result};
use crate::table::{
    ConditionalMutation, ConditionalStatus, MetadataTable, Row, RowRange, ScanEntry,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Rows in a `BTreeMap` behind a lock.
///
/// Like `MemCoordination`, it can be switched unavailable to simulate a
/// partition between the caller and the table.
pub struct MemTable {
    rows: RwLock<BTreeMap<Vec<u8>, BTreeMap<String, Vec<u8>>>>,
    available: AtomicBool,
}

impl MemTable {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.rows.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("metadata table unreachable".into()))
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataTable for MemTable {
    fn scan_batch(
        &self,
        range: &RowRange,
        resume_after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<ScanEntry>> {
        self.check_available()?;
        let rows = self.rows.read()?;

        let lower = match (resume_after, range.start.as_deref()) {
            (Some(after), Some(start)) if after < start => Bound::Included(start.to_vec()),
            (Some(after), _) => Bound::Excluded(after.to_vec()),
            (None, Some(start)) => Bound::Included(start.to_vec()),
            (None, None) => Bound::Unbounded,
        };

        Ok(rows
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| range.contains(key))
            .take(limit)
            .map(|(key, columns)| ScanEntry {
                key: key.clone(),
                row: Ok(Row {
                    key: key.clone(),
                    columns: columns.clone(),
                }),
            })
            .collect())
    }

    fn read_row(&self, key: &[u8]) -> Result<Option<Row>> {
        self.check_available()?;
        Ok(self.rows.read()?.get(key).map(|columns| Row {
            key: key.to_vec(),
            columns: columns.clone(),
        }))
    }

    fn mutate_row(&self, mutation: &ConditionalMutation) -> Result<ConditionalStatus> {
        self.check_available()?;
        let mut rows = self.rows.write()?;

        let current = rows.get(&mutation.row).map(|columns| Row {
            key: mutation.row.clone(),
            columns: columns.clone(),
        });
        if !mutation.conditions_hold(current.as_ref()) {
            return Ok(ConditionalStatus::Rejected);
        }

        let mut columns = current.map(|row| row.columns).unwrap_or_default();
        mutation.apply_to(&mut columns);
        if columns.is_empty() {
            rows.remove(&mutation.row);
        } else {
            rows.insert(mutation.row.clone(), columns);
        }
        Ok(ConditionalStatus::Accepted)
    }
}
