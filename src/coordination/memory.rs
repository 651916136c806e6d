//! In-process coordination service

use crate::common::{Error, Result};
use crate::coordination::{CoordinationService, Version};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Versioned nodes in a map, for tests and single-process deployments.
///
/// `set_available(false)` makes every call fail with `StoreUnavailable`, which
/// is how tests simulate losing the coordination quorum.
pub struct MemCoordination {
    nodes: Mutex<HashMap<String, (Vec<u8>, Version)>>,
    available: AtomicBool,
}

impl MemCoordination {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable(
                "coordination service unreachable".into(),
            ))
        }
    }
}

impl Default for MemCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationService for MemCoordination {
    fn read(&self, path: &str) -> Result<Option<(Vec<u8>, Version)>> {
        self.check_available()?;
        Ok(self.nodes.lock()?.get(path).cloned())
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<Option<Version>> {
        self.check_available()?;
        let mut nodes = self.nodes.lock()?;
        if nodes.contains_key(path) {
            return Ok(None);
        }
        nodes.insert(path.to_string(), (data.to_vec(), 0));
        Ok(Some(0))
    }

    fn compare_and_set(
        &self,
        path: &str,
        data: &[u8],
        expected: Version,
    ) -> Result<Option<Version>> {
        self.check_available()?;
        let mut nodes = self.nodes.lock()?;
        match nodes.get_mut(path) {
            Some((value, version)) if *version == expected => {
                *value = data.to_vec();
                *version += 1;
                Ok(Some(*version))
            }
            _ => Ok(None),
        }
    }

    fn delete(&self, path: &str, expected: Version) -> Result<bool> {
        self.check_available()?;
        let mut nodes = self.nodes.lock()?;
        match nodes.get(path) {
            Some((_, version)) if *version == expected => {
                nodes.remove(path);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_writes() {
        let coord = MemCoordination::new();
        assert!(coord.read("/root").unwrap().is_none());

        assert_eq!(coord.create("/root", b"a").unwrap(), Some(0));
        assert_eq!(coord.create("/root", b"b").unwrap(), None);

        assert_eq!(coord.compare_and_set("/root", b"c", 0).unwrap(), Some(1));
        // Stale version
        assert_eq!(coord.compare_and_set("/root", b"d", 0).unwrap(), None);
        assert_eq!(coord.read("/root").unwrap(), Some((b"c".to_vec(), 1)));

        assert!(!coord.delete("/root", 0).unwrap());
        assert!(coord.delete("/root", 1).unwrap());
        assert!(coord.read("/root").unwrap().is_none());
        assert_eq!(coord.compare_and_set("/root", b"e", 1).unwrap(), None);
    }

    #[test]
    fn test_unavailable() {
        let coord = MemCoordination::new();
        coord.set_available(false);
        assert!(matches!(coord.read("/root"), Err(Error::StoreUnavailable(_))));
        assert!(coord.create("/root", b"a").is_err());
        coord.set_available(true);
        assert!(coord.read("/root").unwrap().is_none());
    }
}
