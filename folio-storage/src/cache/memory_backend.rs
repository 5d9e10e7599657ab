//! In-process durable tier.
//!
//! Keeps records in an ordered map, so prefix scans are range scans. Data
//! does not survive a restart; use it for tests and for processes that have
//! no writable disk.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use folio_core::{FolioResult, StoreError};

use super::traits::DurableStore;

/// Ordered in-memory implementation of [`DurableStore`].
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all namespaces.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// True when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when a record exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.records
            .read()
            .map(|r| r.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn read(&self, key: &str) -> FolioResult<Option<Vec<u8>>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> FolioResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        records.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> FolioResult<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.remove(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> FolioResult<Vec<String>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let store = MemoryStore::new();
        store.write("folio_cache:a", b"one").await.expect("write");

        assert_eq!(
            store.read("folio_cache:a").await.expect("read"),
            Some(b"one".to_vec())
        );
        assert!(store.delete("folio_cache:a").await.expect("delete"));
        assert!(!store.delete("folio_cache:a").await.expect("delete"));
        assert_eq!(store.read("folio_cache:a").await.expect("read"), None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_record() {
        let store = MemoryStore::new();
        store.write("k", b"v1").await.expect("write");
        store.write("k", b"v2").await.expect("write");
        assert_eq!(store.len(), 1);
        assert_eq!(store.read("k").await.expect("read"), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_keys_with_prefix_is_scoped_and_ordered() {
        let store = MemoryStore::new();
        for key in [
            "folio_cache:b",
            "folio_cache:a",
            "folio_cache_v2:a",
            "theme",
            "folio_cachf:z",
        ] {
            store.write(key, b"x").await.expect("write");
        }

        let keys = store.keys_with_prefix("folio_cache:").await.expect("scan");
        assert_eq!(keys, vec!["folio_cache:a".to_string(), "folio_cache:b".to_string()]);
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryStore::new();
        let view = store.clone();
        store.write("k", b"v").await.expect("write");
        assert!(view.contains("k"));
        assert!(!view.is_empty());
    }
}
