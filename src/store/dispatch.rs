//! Routing of single-tablet operations to the store that owns the tablet
//!
//! The root tablet is the only tablet whose state is not in the metadata table;
//! this module is the one place that knows it.

use crate::common::{Config, Error, Result};
use crate::coordination::CoordinationService;
use crate::model::{Assignment, KeyExtent, LocationState};
use crate::store::{LocationScan, MetadataStateStore, RootStateStore, TabletStateStore};
use crate::table::MetadataTable;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtentClass {
    Root,
    Metadata,
}

impl ExtentClass {
    pub fn of(extent: &KeyExtent) -> Self {
        if extent.is_root() {
            ExtentClass::Root
        } else {
            ExtentClass::Metadata
        }
    }
}

impl fmt::Display for ExtentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtentClass::Root => write!(f, "root"),
            ExtentClass::Metadata => write!(f, "metadata"),
        }
    }
}

/// Supplies the store responsible for a class of extents.
pub trait StoreProvider: Send + Sync {
    fn store_for(&self, class: ExtentClass) -> Option<Arc<dyn TabletStateStore>>;
}

/// The standard provider: one store per extent class
#[derive(Clone, Default)]
pub struct StoreRegistry {
    root: Option<Arc<dyn TabletStateStore>>,
    metadata: Option<Arc<dyn TabletStateStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, store: Arc<dyn TabletStateStore>) -> Self {
        self.root = Some(store);
        self
    }

    pub fn with_metadata(mut self, store: Arc<dyn TabletStateStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    /// Build both stores over the given backends.
    pub fn from_backends(
        coordination: Arc<dyn CoordinationService>,
        table: Arc<dyn MetadataTable>,
        config: &Config,
    ) -> Self {
        let root = RootStateStore::new(coordination, config.root_node_path.clone());
        let metadata = MetadataStateStore::new(table).with_batch_size(config.scan_batch_size);
        Self::new()
            .with_root(Arc::new(root))
            .with_metadata(Arc::new(metadata))
    }
}

impl StoreProvider for StoreRegistry {
    fn store_for(&self, class: ExtentClass) -> Option<Arc<dyn TabletStateStore>> {
        match class {
            ExtentClass::Root => self.root.clone(),
            ExtentClass::Metadata => self.metadata.clone(),
        }
    }
}

/// Resolve the store that owns `extent`.
pub fn resolve(
    provider: &dyn StoreProvider,
    extent: &KeyExtent,
) -> Result<Arc<dyn TabletStateStore>> {
    let class = ExtentClass::of(extent);
    provider.store_for(class).ok_or_else(|| {
        Error::NoStoreForExtent(format!("{} (no {} store configured)", extent, class))
    })
}

/// Mark one tablet as having no current or future location.
pub fn unassign(provider: &dyn StoreProvider, tablet: &LocationState) -> Result<()> {
    resolve(provider, tablet.extent())?.unassign_one(tablet)
}

/// Record that a server has brought one tablet online.
pub fn set_location(provider: &dyn StoreProvider, assignment: &Assignment) -> Result<()> {
    resolve(provider, &assignment.tablet)?.set_location(assignment)
}

/// Record where one tablet is about to be loaded.
pub fn set_future_location(provider: &dyn StoreProvider, assignment: &Assignment) -> Result<()> {
    resolve(provider, &assignment.tablet)?.set_future_location(assignment)
}

/// Scan the root store, then the metadata store.
pub fn scan_all(provider: &dyn StoreProvider) -> Result<LocationScan> {
    let mut scans = Vec::with_capacity(2);
    for class in [ExtentClass::Root, ExtentClass::Metadata] {
        let store = provider
            .store_for(class)
            .ok_or_else(|| Error::NoStoreForExtent(format!("no {} store configured", class)))?;
        scans.push(store.scan());
    }
    Ok(Box::new(scans.into_iter().flatten()))
}

/// Find the current state of one tablet by scanning its store.
pub fn lookup(provider: &dyn StoreProvider, extent: &KeyExtent) -> Result<Option<LocationState>> {
    for state in resolve(provider, extent)?.scan() {
        match state {
            Ok(state) if state.extent() == extent => return Ok(Some(state)),
            Ok(_) | Err(Error::MalformedRecord(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}
