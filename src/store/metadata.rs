//! State store for every tablet except the root tablet
//!
//! Each tablet is a row of the metadata table keyed by its metadata row (see
//! [`KeyExtent::metadata_row`]). Mutations are conditional row mutations: the
//! precondition of each state machine step is expressed as column conditions,
//! so concurrent writers are serialized by the table and a writer whose
//! precondition no longer holds is rejected.

use crate::common::{Error, Result};
use crate::model::{Assignment, KeyExtent, LocationState, Locations, ServerSession, Transition};
use crate::store::{log_result, BatchOutcome, LocationScan, TabletStateStore};
use crate::table::{
    ConditionalMutation, ConditionalStatus, MetadataTable, Row, RowRange, ScanEntry,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Metadata table columns
pub mod columns {
    /// Encoded previous end row; present on every tablet row
    pub const PREV_ROW: &str = "~tab:~pr";
    pub const LOCATION: &str = "loc";
    pub const FUTURE: &str = "future";
    pub const LAST: &str = "last";
    /// Prefix of write-ahead log reference columns, followed by the log path
    pub const LOG_PREFIX: &str = "log:";
}

const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Clone)]
pub struct MetadataStateStore {
    table: Arc<dyn MetadataTable>,
    range: RowRange,
    batch_size: usize,
}

impl MetadataStateStore {
    pub const NAME: &'static str = "metadata";

    pub fn new(table: Arc<dyn MetadataTable>) -> Self {
        Self {
            table,
            range: RowRange::all(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Restrict scans to `range` (e.g. the rows of one table)
    pub fn with_range(mut self, range: RowRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Create the row of a newly created tablet, with no locations.
    ///
    /// Registering the same extent again is a no-op; a different extent already
    /// owning the row (e.g. before a split was recorded) is a `Conflict`.
    pub fn register_tablet(&self, extent: &KeyExtent) -> Result<()> {
        check_owned(extent)?;
        let prev = extent.encoded_prev_end_row();
        let mutation = ConditionalMutation::new(extent.metadata_row())
            .require(columns::PREV_ROW, None)
            .put(columns::PREV_ROW, prev.clone());

        match self.table.mutate_row(&mutation)? {
            ConditionalStatus::Accepted => {
                tracing::info!("Registered tablet {}", extent);
                Ok(())
            }
            ConditionalStatus::Rejected => {
                let row = self.table.read_row(&mutation.row)?;
                match row.as_ref().and_then(|row| row.get(columns::PREV_ROW)) {
                    Some(existing) if existing == prev.as_slice() => Ok(()),
                    _ => Err(Error::conflict(
                        extent,
                        "row is registered to a different extent",
                    )),
                }
            }
        }
    }

    /// Write a mutation; on rejection, decide from the row whether `step`
    /// already holds.
    fn mutate<F>(&self, extent: &KeyExtent, mutation: ConditionalMutation, step: F) -> Result<()>
    where
        F: Fn(&Locations) -> Transition,
    {
        check_owned(extent)?;
        if self.table.mutate_row(&mutation)? == ConditionalStatus::Accepted {
            return Ok(());
        }

        let row = self
            .table
            .read_row(&mutation.row)?
            .ok_or_else(|| Error::conflict(extent, "tablet not present in metadata table"))?;
        let state = decode_row(&row)?;
        if state.extent() != extent {
            return Err(Error::conflict(
                extent,
                format!("metadata row now describes {}", state.extent()),
            ));
        }
        match step(state.locations()) {
            Transition::AlreadyApplied => Ok(()),
            Transition::Reject(reason) => Err(Error::conflict(extent, reason)),
            Transition::Apply(_) => Err(Error::conflict(extent, "row changed concurrently")),
        }
    }
}

fn check_owned(extent: &KeyExtent) -> Result<()> {
    if extent.is_root() {
        return Err(Error::NoStoreForExtent(format!(
            "{} is kept by the root store",
            extent
        )));
    }
    Ok(())
}

fn base_mutation(extent: &KeyExtent) -> ConditionalMutation {
    ConditionalMutation::new(extent.metadata_row())
        .require(columns::PREV_ROW, Some(extent.encoded_prev_end_row()))
}

fn encoded(session: Option<&ServerSession>) -> Option<Vec<u8>> {
    session.map(ServerSession::encode)
}

fn decode_session(row: &Row, column: &str) -> Result<Option<ServerSession>> {
    row.get(column).map(ServerSession::decode).transpose()
}

/// Decode a metadata row into a location state.
pub fn decode_row(row: &Row) -> Result<LocationState> {
    let prev = row.get(columns::PREV_ROW).ok_or_else(|| {
        Error::MalformedRecord(format!(
            "metadata row {} has no previous end row",
            hex::encode(&row.key)
        ))
    })?;
    let extent = KeyExtent::from_metadata_row(&row.key, prev)?;

    let walogs = row
        .columns
        .keys()
        .filter_map(|column| column.strip_prefix(columns::LOG_PREFIX))
        .map(str::to_string)
        .collect();

    LocationState::new(
        extent,
        decode_session(row, columns::LOCATION)?,
        decode_session(row, columns::FUTURE)?,
        decode_session(row, columns::LAST)?,
        walogs,
    )
}

impl TabletStateStore for MetadataStateStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn scan(&self) -> LocationScan {
        Box::new(MetadataScanner::new(
            self.table.clone(),
            self.range.clone(),
            self.batch_size,
        ))
    }

    fn set_future_locations(&self, assignments: &[Assignment]) -> BatchOutcome {
        let mut outcome = BatchOutcome::with_capacity(assignments.len());
        for assignment in assignments {
            let mutation = base_mutation(&assignment.tablet)
                .require(columns::LOCATION, None)
                .require(columns::FUTURE, None)
                .put(columns::FUTURE, assignment.server.encode());
            let result = assignment.server.validate().and_then(|()| {
                self.mutate(&assignment.tablet, mutation, |locations| {
                    locations.assign_future(&assignment.server)
                })
            });
            log_result("set future location", &assignment.tablet, &result);
            outcome.push(assignment.tablet.clone(), result);
        }
        outcome
    }

    fn set_locations(&self, assignments: &[Assignment]) -> BatchOutcome {
        let mut outcome = BatchOutcome::with_capacity(assignments.len());
        for assignment in assignments {
            let mutation = base_mutation(&assignment.tablet)
                .require(columns::FUTURE, Some(assignment.server.encode()))
                .require(columns::LOCATION, None)
                .put(columns::LOCATION, assignment.server.encode())
                .put(columns::LAST, assignment.server.encode())
                .delete(columns::FUTURE);
            let result = assignment.server.validate().and_then(|()| {
                self.mutate(&assignment.tablet, mutation, |locations| {
                    locations.promote(&assignment.server)
                })
            });
            log_result("set location", &assignment.tablet, &result);
            outcome.push(assignment.tablet.clone(), result);
        }
        outcome
    }

    fn unassign(&self, tablets: &[LocationState]) -> BatchOutcome {
        let mut outcome = BatchOutcome::with_capacity(tablets.len());
        for tablet in tablets {
            let mut mutation = base_mutation(tablet.extent())
                .require(columns::LOCATION, encoded(tablet.current()))
                .require(columns::FUTURE, encoded(tablet.future()))
                .delete(columns::LOCATION)
                .delete(columns::FUTURE);
            if let Some(current) = tablet.current() {
                mutation = mutation.put(columns::LAST, current.encode());
            }
            let result = self.mutate(tablet.extent(), mutation, |locations| {
                locations.unassign(tablet.current(), tablet.future())
            });
            log_result("unassign", tablet.extent(), &result);
            outcome.push(tablet.extent().clone(), result);
        }
        outcome
    }
}

/// Streams metadata rows a batch at a time.
///
/// Every fetch resumes strictly after the last key seen, so the scan ends even
/// while rows are being written, and memory is bounded by the batch size.
struct MetadataScanner {
    table: Arc<dyn MetadataTable>,
    range: RowRange,
    batch_size: usize,
    buffer: VecDeque<ScanEntry>,
    resume_after: Option<Vec<u8>>,
    exhausted: bool,
    root_row: Vec<u8>,
}

impl MetadataScanner {
    fn new(table: Arc<dyn MetadataTable>, range: RowRange, batch_size: usize) -> Self {
        Self {
            table,
            range,
            batch_size,
            buffer: VecDeque::new(),
            resume_after: None,
            exhausted: false,
            root_row: KeyExtent::root().metadata_row(),
        }
    }

    fn fetch(&mut self) -> Result<()> {
        let rows = self
            .table
            .scan_batch(&self.range, self.resume_after.as_deref(), self.batch_size)?;
        if rows.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.resume_after = Some(last.key.clone());
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl Iterator for MetadataScanner {
    type Item = Result<LocationState>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                if entry.key == self.root_row {
                    continue;
                }
                let decoded = entry.row.and_then(|row| decode_row(&row));
                if let Err(e) = &decoded {
                    tracing::warn!("Skipping metadata row {}: {}", hex::encode(&entry.key), e);
                }
                return Some(decoded);
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
