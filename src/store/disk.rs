use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

/// Collection backed by a fjall partition. Entries survive restarts.
pub struct DiskCollection {
    keyspace: Arc<Keyspace>,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Arc<Keyspace>, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.partition.get(key)? else {
            debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_slice(&raw)?;
        if let Some(expires_at) = entry.expires_at
            && SystemTime::now() > expires_at
        {
            debug!("Cache entry expired for key: {}", String::from_utf8_lossy(key));
            self.partition.remove(key)?;
            return Ok(None);
        }
        debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
        Ok(Some(entry.value))
    }

    fn write(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|d| SystemTime::now() + d),
        };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        self.keyspace.persist(PersistMode::SyncData)?;
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.read(key) {
            Ok(value) => value,
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.write(key, value, ttl)
    }

    async fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fjall::PartitionCreateOptions;
    use tempfile::tempdir;
    use tokio::time::sleep;

    fn collection(path: &std::path::Path) -> DiskCollection {
        let keyspace = Arc::new(fjall::Config::new(path).open().unwrap());
        let partition = keyspace
            .open_partition("test", PartitionCreateOptions::default())
            .unwrap();
        DiskCollection::new(keyspace, partition)
    }

    #[tokio::test]
    async fn test_disk_get_put() {
        let dir = tempdir().unwrap();
        let cache = collection(dir.path());

        assert!(cache.get(b"key1").await.is_none());
        cache.put(b"key1", b"123", None).await.unwrap();
        assert_eq!(cache.get(b"key1").await, Some(b"123".to_vec()));
        assert!(cache.get(b"key2").await.is_none());
    }

    #[tokio::test]
    async fn test_disk_ttl_expiration() {
        let dir = tempdir().unwrap();
        let cache = collection(dir.path());

        cache
            .put(b"key1", b"123", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(cache.get(b"key1").await, Some(b"123".to_vec()));

        sleep(Duration::from_millis(20)).await;
        assert!(cache.get(b"key1").await.is_none());
    }

    #[tokio::test]
    async fn test_disk_remove() {
        let dir = tempdir().unwrap();
        let cache = collection(dir.path());

        cache.put(b"key1", b"1", None).await.unwrap();
        cache.put(b"key2", b"2", None).await.unwrap();
        cache.remove(b"key1").await;
        assert!(cache.get(b"key1").await.is_none());
        assert_eq!(cache.get(b"key2").await, Some(b"2".to_vec()));
    }
}
