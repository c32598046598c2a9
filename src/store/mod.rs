pub mod disk;
pub mod memory;
pub mod preferences;

use crate::core::cache::{KeyValueCollection, Store};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::debug;

/// A thread-safe key-value store that can hold multiple collections.
///
/// Persistent collections need a keyspace; when it could not be opened the
/// store still serves in-memory collections.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    /// Opens (or creates) the on-disk keyspace under `data_path/cache`.
    pub fn open(data_path: &Path) -> Self {
        let cache_dir = data_path.join("cache");
        let keyspace = match fjall::Config::new(&cache_dir).open() {
            Ok(keyspace) => Some(Arc::new(keyspace)),
            Err(e) => {
                debug!("Could not open keyspace at {}: {}", cache_dir.display(), e);
                None
            }
        };

        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    /// A store without a keyspace; persistent collections are unavailable.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }

    fn create(&self, name: &str, persist: bool) -> Option<Arc<dyn KeyValueCollection>> {
        if !persist {
            return Some(Arc::new(MemoryCollection::new()));
        }
        let keyspace = self.keyspace.as_ref()?;
        match keyspace.open_partition(name, PartitionCreateOptions::default()) {
            Ok(partition) => Some(Arc::new(DiskCollection::new(
                Arc::clone(keyspace),
                partition,
            ))),
            Err(e) => {
                debug!("Could not open partition {}: {}", name, e);
                None
            }
        }
    }
}

impl Store for KeyValueStore {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>> {
        if let Some(existing) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Some(Arc::clone(existing));
        }
        if !create_if_missing {
            return None;
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = collections.get(name) {
            return Some(Arc::clone(existing));
        }
        let collection = self.create(name, persist)?;
        collections.insert(name.to_string(), Arc::clone(&collection));
        Some(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_collections_are_shared_by_name() {
        let dir = tempdir().unwrap();
        let store = KeyValueStore::open(dir.path());
        assert!(store.is_persistent());

        let first = store.get_collection("rates", true, true).unwrap();
        first.put(b"k", b"v", None).await.unwrap();

        let second = store.get_collection("rates", true, false).unwrap();
        assert_eq!(second.get(b"k").await, Some(b"v".to_vec()));
    }

    #[test]
    fn test_missing_collection_without_create() {
        let store = KeyValueStore::in_memory();
        assert!(store.get_collection("prefs", false, false).is_none());
        assert!(store.get_collection("prefs", false, true).is_some());
        assert!(store.get_collection("prefs", false, false).is_some());
    }

    #[test]
    fn test_persistent_collection_needs_keyspace() {
        let store = KeyValueStore::in_memory();
        assert!(store.get_collection("prefs", true, true).is_none());
    }
}
