//! State store for the root tablet
//!
//! The root tablet's locations cannot live in the metadata table, because the
//! root tablet is what serves the metadata table's own entries. They are kept
//! as one JSON document in a coordination node instead, and every mutation is a
//! compare-and-set on that node's version.

use crate::common::{Error, Result};
use crate::coordination::{CoordinationService, Version};
use crate::model::{Assignment, KeyExtent, LocationState, Locations, Transition};
use crate::store::{log_result, BatchOutcome, LocationScan, TabletStateStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Contents of the root tablet's coordination node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RootRecord {
    locations: Locations,
    #[serde(default)]
    walogs: Vec<String>,
}

#[derive(Clone)]
pub struct RootStateStore {
    coordination: Arc<dyn CoordinationService>,
    path: String,
}

impl RootStateStore {
    pub const NAME: &'static str = "root";

    pub fn new(coordination: Arc<dyn CoordinationService>, path: impl Into<String>) -> Self {
        Self {
            coordination,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create the root record with no locations. Returns `false` if it exists.
    pub fn initialize(&self) -> Result<bool> {
        let data = serde_json::to_vec(&RootRecord::default())?;
        let created = self.coordination.create(&self.path, &data)?.is_some();
        if created {
            tracing::info!("Initialized root tablet record at {}", self.path);
        }
        Ok(created)
    }

    fn load(&self) -> Result<Option<(RootRecord, Version)>> {
        match self.coordination.read(&self.path)? {
            Some((data, version)) => {
                let record = serde_json::from_slice(&data).map_err(|e| {
                    Error::MalformedRecord(format!("root tablet record {}: {}", self.path, e))
                })?;
                Ok(Some((record, version)))
            }
            None => Ok(None),
        }
    }

    fn read_state(&self) -> Result<Option<LocationState>> {
        match self.load()? {
            Some((record, _)) => Ok(Some(LocationState::from_locations(
                KeyExtent::root(),
                record.locations,
                record.walogs,
            )?)),
            None => Ok(None),
        }
    }

    /// Write `record` if the node is still at `version`; a missing node is created.
    fn store(&self, record: &RootRecord, version: Option<Version>) -> Result<bool> {
        let data = serde_json::to_vec(record)?;
        let written = match version {
            Some(version) => self
                .coordination
                .compare_and_set(&self.path, &data, version)?
                .is_some(),
            None => self.coordination.create(&self.path, &data)?.is_some(),
        };
        Ok(written)
    }

    /// Run one state machine step against the root record.
    fn apply<F>(&self, extent: &KeyExtent, step: F) -> Result<()>
    where
        F: Fn(&Locations) -> Transition,
    {
        if !extent.is_root() {
            return Err(Error::NoStoreForExtent(format!(
                "{} is not the root tablet",
                extent
            )));
        }

        let (record, version) = match self.load()? {
            Some((record, version)) => (record, Some(version)),
            None => (RootRecord::default(), None),
        };

        let next = match step(&record.locations) {
            Transition::AlreadyApplied => return Ok(()),
            Transition::Reject(reason) => return Err(Error::conflict(extent, reason)),
            Transition::Apply(next) => next,
        };

        let updated = RootRecord {
            locations: next,
            ..record
        };
        if self.store(&updated, version)? {
            tracing::debug!("Root tablet locations now {:?}", updated.locations);
            return Ok(());
        }

        // Lost the compare-and-set: succeed only if the winner did our work.
        let current = self.load()?.map(|(record, _)| record.locations).unwrap_or_default();
        match step(&current) {
            Transition::AlreadyApplied => Ok(()),
            _ => Err(Error::conflict(
                extent,
                format!("root record changed concurrently at {}", self.path),
            )),
        }
    }
}

impl TabletStateStore for RootStateStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn scan(&self) -> LocationScan {
        let store = self.clone();
        Box::new(std::iter::once(()).filter_map(move |_| store.read_state().transpose()))
    }

    fn set_future_locations(&self, assignments: &[Assignment]) -> BatchOutcome {
        let mut outcome = BatchOutcome::with_capacity(assignments.len());
        for assignment in assignments {
            let result = assignment.server.validate().and_then(|()| {
                self.apply(&assignment.tablet, |locations| {
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
            let result = assignment.server.validate().and_then(|()| {
                self.apply(&assignment.tablet, |locations| {
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
            let result = self.apply(tablet.extent(), |locations| {
                locations.unassign(tablet.current(), tablet.future())
            });
            log_result("unassign", tablet.extent(), &result);
            outcome.push(tablet.extent().clone(), result);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemCoordination;
    use crate::model::{ServerSession, TableId};

    const PATH: &str = "/tablet-state/root_tablet";

    fn store() -> (Arc<MemCoordination>, RootStateStore) {
        let coord = Arc::new(MemCoordination::new());
        let store = RootStateStore::new(coord.clone(), PATH);
        (coord, store)
    }

    fn s(n: u64) -> ServerSession {
        ServerSession::new(format!("tserver-{}:9997", n), n)
    }

    fn scan_one(store: &RootStateStore) -> LocationState {
        let mut states: Vec<_> = store.scan().collect::<Result<_>>().unwrap();
        assert_eq!(states.len(), 1);
        states.remove(0)
    }

    #[test]
    fn test_scan_uninitialized_is_empty() {
        let (_, store) = store();
        assert_eq!(store.scan().count(), 0);
        assert!(store.initialize().unwrap());
        assert!(!store.initialize().unwrap());

        let state = scan_one(&store);
        assert!(state.extent().is_root());
        assert!(state.current().is_none());
        assert!(state.future().is_none());
    }

    #[test]
    fn test_assign_and_promote() {
        let (_, store) = store();
        let assignment = Assignment::new(KeyExtent::root(), s(1));

        // The record is created by the first mutation.
        store.set_future_location(&assignment).unwrap();
        let state = scan_one(&store);
        assert_eq!(state.future(), Some(&s(1)));
        assert!(state.current().is_none());

        store.set_location(&assignment).unwrap();
        let state = scan_one(&store);
        assert_eq!(state.current(), Some(&s(1)));
        assert!(state.future().is_none());
        assert_eq!(state.last(), Some(&s(1)));

        // Retrying after success is a no-op.
        store.set_location(&assignment).unwrap();
        assert_eq!(scan_one(&store).current(), Some(&s(1)));
    }

    #[test]
    fn test_conflicts_leave_state_unchanged() {
        let (_, store) = store();
        store
            .set_future_location(&Assignment::new(KeyExtent::root(), s(1)))
            .unwrap();

        let err = store
            .set_location(&Assignment::new(KeyExtent::root(), s(2)))
            .unwrap_err();
        assert!(err.is_conflict());

        let err = store
            .set_future_location(&Assignment::new(KeyExtent::root(), s(2)))
            .unwrap_err();
        assert!(err.is_conflict());

        let state = scan_one(&store);
        assert_eq!(state.future(), Some(&s(1)));
    }

    #[test]
    fn test_unassign_keeps_last_location() {
        let (_, store) = store();
        let assignment = Assignment::new(KeyExtent::root(), s(1));
        store.set_future_location(&assignment).unwrap();
        store.set_location(&assignment).unwrap();

        let hosted = scan_one(&store);
        store.unassign_one(&hosted).unwrap();
        let state = scan_one(&store);
        assert!(state.current().is_none());
        assert_eq!(state.last(), Some(&s(1)));

        // Unassigning again with the stale view is a no-op.
        store.unassign_one(&hosted).unwrap();
        assert_eq!(scan_one(&store), state);
    }

    #[test]
    fn test_session_addresses_are_checked() {
        let (_, store) = store();
        let err = store
            .set_future_location(&Assignment::new(KeyExtent::root(), ServerSession::new("h", 1)))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
        assert_eq!(store.scan().count(), 0);

        let v6 = ServerSession::new("[2001:db8::7]:9997", 3);
        let assignment = Assignment::new(KeyExtent::root(), v6.clone());
        store.set_future_location(&assignment).unwrap();
        store.set_location(&assignment).unwrap();
        assert_eq!(scan_one(&store).current(), Some(&v6));
    }

    #[test]
    fn test_rejects_other_extents() {
        let (_, store) = store();
        let other = KeyExtent::new(TableId::new("1"), None, None).unwrap();
        let err = store
            .set_future_location(&Assignment::new(other, s(1)))
            .unwrap_err();
        assert!(matches!(err, Error::NoStoreForExtent(_)));
        assert_eq!(store.scan().count(), 0);
    }

    #[test]
    fn test_unavailable_and_malformed() {
        let (coord, store) = store();
        coord.set_available(false);
        let outcome = store.set_future_locations(&[Assignment::new(KeyExtent::root(), s(1))]);
        assert!(matches!(
            outcome.into_result(),
            Err(Error::StoreUnavailable(_))
        ));
        let results: Vec<_> = store.scan().collect();
        assert!(matches!(results.as_slice(), [Err(Error::StoreUnavailable(_))]));

        coord.set_available(true);
        coord.create(PATH, b"{not json").unwrap();
        let results: Vec<_> = store.scan().collect();
        assert!(matches!(results.as_slice(), [Err(Error::MalformedRecord(_))]));
        let err = store
            .set_future_location(&Assignment::new(KeyExtent::root(), s(1)))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    /// Applies a competing write right before the first compare-and-set.
    struct RacingCoordination {
        inner: MemCoordination,
        competitor: std::sync::Mutex<Option<RootRecord>>,
    }

    impl CoordinationService for RacingCoordination {
        fn read(&self, path: &str) -> Result<Option<(Vec<u8>, Version)>> {
            self.inner.read(path)
        }

        fn create(&self, path: &str, data: &[u8]) -> Result<Option<Version>> {
            self.inner.create(path, data)
        }

        fn compare_and_set(
            &self,
            path: &str,
            data: &[u8],
            expected: Version,
        ) -> Result<Option<Version>> {
            if let Some(record) = self.competitor.lock().unwrap().take() {
                let competing = serde_json::to_vec(&record).unwrap();
                self.inner.compare_and_set(path, &competing, expected)?;
            }
            self.inner.compare_and_set(path, data, expected)
        }

        fn delete(&self, path: &str, expected: Version) -> Result<bool> {
            self.inner.delete(path, expected)
        }
    }

    fn racing_store(competitor: RootRecord) -> RootStateStore {
        let coord = RacingCoordination {
            inner: MemCoordination::new(),
            competitor: std::sync::Mutex::new(Some(competitor)),
        };
        let store = RootStateStore::new(Arc::new(coord), PATH);
        store.initialize().unwrap();
        store
    }

    #[test]
    fn test_lost_compare_and_set_is_conflict() {
        let store = racing_store(RootRecord {
            locations: Locations {
                future: Some(s(7)),
                ..Default::default()
            },
            walogs: vec![],
        });

        let err = store
            .set_future_location(&Assignment::new(KeyExtent::root(), s(1)))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(scan_one(&store).future(), Some(&s(7)));
    }

    #[test]
    fn test_lost_compare_and_set_to_same_outcome_succeeds() {
        let store = racing_store(RootRecord {
            locations: Locations {
                future: Some(s(1)),
                ..Default::default()
            },
            walogs: vec![],
        });

        store
            .set_future_location(&Assignment::new(KeyExtent::root(), s(1)))
            .unwrap();
        assert_eq!(scan_one(&store).future(), Some(&s(1)));
    }
}
