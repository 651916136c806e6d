//! Verify assignment state integrity

use crate::common::{Error, Result};
use crate::model::{KeyExtent, ServerSession, TabletState};
use crate::store::{ExtentClass, StoreProvider, TabletStateStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Audit one store: classify every tablet and flag records it should not hold.
///
/// Malformed records are counted, not fatal; a backend failure aborts.
pub fn verify_store(
    store: &dyn TabletStateStore,
    live: &HashSet<ServerSession>,
) -> Result<VerifyReport> {
    tracing::info!("Verifying {} store", store.name());
    let mut report = VerifyReport::default();

    for state in store.scan() {
        let state = match state {
            Ok(state) => state,
            Err(Error::MalformedRecord(reason)) => {
                report.malformed.push(reason);
                continue;
            }
            Err(e) => return Err(e),
        };

        report.total += 1;
        let tablet_state = state.state(live);
        *report.states.entry(tablet_state).or_default() += 1;
        if tablet_state == TabletState::AssignedToDeadServer {
            report.dead_server_tablets.push(state.extent().clone());
        }

        let expected = match ExtentClass::of(state.extent()) {
            ExtentClass::Root => crate::store::RootStateStore::NAME,
            ExtentClass::Metadata => crate::store::MetadataStateStore::NAME,
        };
        if store.name() != expected {
            tracing::warn!("{} reported by the {} store", state.extent(), store.name());
            report.misplaced.push(state.extent().clone());
        }
    }

    Ok(report)
}

/// Audit the root store and the metadata store together.
pub fn verify_all(
    provider: &dyn StoreProvider,
    live: &HashSet<ServerSession>,
) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    for class in [ExtentClass::Root, ExtentClass::Metadata] {
        let store = provider
            .store_for(class)
            .ok_or_else(|| Error::NoStoreForExtent(format!("no {} store configured", class)))?;
        report.merge(verify_store(store.as_ref(), live)?);
    }
    Ok(report)
}

#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
    pub total: usize,
    pub states: BTreeMap<TabletState, usize>,
    pub dead_server_tablets: Vec<KeyExtent>,
    pub malformed: Vec<String>,
    pub misplaced: Vec<KeyExtent>,
}

impl VerifyReport {
    pub fn count(&self, state: TabletState) -> usize {
        self.states.get(&state).copied().unwrap_or(0)
    }

    /// No corrupt or misplaced records
    pub fn is_consistent(&self) -> bool {
        self.malformed.is_empty() && self.misplaced.is_empty()
    }

    pub fn merge(&mut self, other: VerifyReport) {
        self.total += other.total;
        for (state, count) in other.states {
            *self.states.entry(state).or_default() += count;
        }
        self.dead_server_tablets.extend(other.dead_server_tablets);
        self.malformed.extend(other.malformed);
        self.misplaced.extend(other.misplaced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Config;
    use crate::coordination::MemCoordination;
    use crate::model::{Assignment, TableId};
    use crate::store::{dispatch, MetadataStateStore, StoreRegistry};
    use crate::table::{ConditionalMutation, MemTable, MetadataTable};
    use std::sync::Arc;

    #[test]
    fn test_verify_counts_states() {
        let table = Arc::new(MemTable::new());
        let registry = StoreRegistry::from_backends(
            Arc::new(MemCoordination::new()),
            table.clone(),
            &Config::default(),
        );
        let metadata = MetadataStateStore::new(table.clone());

        let alive = ServerSession::new("alive:9997", 1);
        let dead = ServerSession::new("dead:9997", 2);
        let live: HashSet<_> = [alive.clone()].into_iter().collect();

        let hosted = KeyExtent::new(TableId::new("1"), Some(b"m".to_vec()), None).unwrap();
        let orphaned = KeyExtent::new(TableId::new("1"), None, Some(b"m".to_vec())).unwrap();
        let idle = KeyExtent::new(TableId::new("2"), None, None).unwrap();
        for e in [&hosted, &orphaned, &idle] {
            metadata.register_tablet(e).unwrap();
        }
        let assign = |extent: &KeyExtent, server: &ServerSession| {
            let assignment = Assignment::new(extent.clone(), server.clone());
            dispatch::set_future_location(&registry, &assignment).unwrap()
        };
        assign(&hosted, &alive);
        dispatch::set_location(&registry, &Assignment::new(hosted.clone(), alive.clone())).unwrap();
        assign(&orphaned, &dead);
        assign(&KeyExtent::root(), &alive);

        table
            .mutate_row(&ConditionalMutation::new(b"3<".to_vec()).put("loc", b"junk".to_vec()))
            .unwrap();

        let report = verify_all(&registry, &live).unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.count(TabletState::Hosted), 1);
        assert_eq!(report.count(TabletState::Assigned), 1);
        assert_eq!(report.count(TabletState::Unassigned), 1);
        assert_eq!(report.count(TabletState::AssignedToDeadServer), 1);
        assert_eq!(report.dead_server_tablets, vec![orphaned]);
        assert_eq!(report.malformed.len(), 1);
        assert!(report.misplaced.is_empty());
        assert!(!report.is_consistent());
    }
}
