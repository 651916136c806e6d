//! The sorted-map table holding tablet metadata rows
//!
//! The table is only used through two primitives: batched forward range
//! scans, and single-row conditional mutations whose conditions compare column
//! values (or their absence) before any put or delete is applied.

pub mod memory;
pub mod rocks;

pub use memory::MemTable;
pub use rocks::RocksTable;

use crate::common::Result;
use crate::model::TableId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row: key plus column name → value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: Vec<u8>,
    pub columns: BTreeMap<String, Vec<u8>>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&[u8]> {
        self.columns.get(column).map(Vec::as_slice)
    }
}

/// One entry of a scan batch.
///
/// `row` is `Err` when the stored value cannot be decoded; the key is still
/// reported so a scan can resume past it.
#[derive(Debug)]
pub struct ScanEntry {
    pub key: Vec<u8>,
    pub row: Result<Row>,
}

/// Half-open key interval `[start, end)`; `None` is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: Option<Vec<u8>>,
    pub end: Option<Vec<u8>>,
}

impl RowRange {
    pub fn all() -> Self {
        Self::default()
    }

    /// Every metadata row of one table (`id;...` and `id<`).
    pub fn table(table_id: &TableId) -> Self {
        let mut start = table_id.as_str().as_bytes().to_vec();
        let mut end = start.clone();
        start.push(b';');
        end.push(b'=');
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.start.as_deref().map_or(true, |start| key >= start)
            && self.end.as_deref().map_or(true, |end| key < end)
    }
}

/// Expected value of a column; `None` requires the column to be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub expected: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalMutation {
    pub row: Vec<u8>,
    pub conditions: Vec<Condition>,
    pub puts: Vec<(String, Vec<u8>)>,
    pub deletes: Vec<String>,
}

impl ConditionalMutation {
    pub fn new(row: Vec<u8>) -> Self {
        Self {
            row,
            conditions: Vec::new(),
            puts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn require(mut self, column: &str, expected: Option<Vec<u8>>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            expected,
        });
        self
    }

    pub fn put(mut self, column: &str, value: Vec<u8>) -> Self {
        self.puts.push((column.to_string(), value));
        self
    }

    pub fn delete(mut self, column: &str) -> Self {
        self.deletes.push(column.to_string());
        self
    }

    /// Check the conditions against the current row, `None` if it does not exist.
    pub fn conditions_hold(&self, current: Option<&Row>) -> bool {
        self.conditions.iter().all(|cond| {
            let actual = current.and_then(|row| row.get(&cond.column));
            actual == cond.expected.as_deref()
        })
    }

    /// Apply deletes then puts to `columns`.
    pub fn apply_to(&self, columns: &mut BTreeMap<String, Vec<u8>>) {
        for column in &self.deletes {
            columns.remove(column);
        }
        for (column, value) in &self.puts {
            columns.insert(column.clone(), value.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalStatus {
    Accepted,
    Rejected,
}

pub trait MetadataTable: Send + Sync {
    /// Up to `limit` rows of `range` in key order, starting strictly after
    /// `resume_after` when given.
    fn scan_batch(
        &self,
        range: &RowRange,
        resume_after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<ScanEntry>>;

    fn read_row(&self, key: &[u8]) -> Result<Option<Row>>;

    /// Atomically check the mutation's conditions and apply it.
    ///
    /// A row left without columns ceases to exist.
    fn mutate_row(&self, mutation: &ConditionalMutation) -> Result<ConditionalStatus>;
}
