//! LMDB-backed durable tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped key-value store that survives process restarts.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `read` and `keys_with_prefix` (a cursor over
//!   the prefix range)
//! - Write transactions for `write` and `delete`

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use folio_core::{FolioResult, StoreError};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::traits::DurableStore;

/// Error type for LMDB store setup and transactions.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to FolioError.
impl From<LmdbStoreError> for folio_core::FolioError {
    fn from(e: LmdbStoreError) -> Self {
        folio_core::FolioError::Storage(StoreError::Backend {
            reason: e.to_string(),
        })
    }
}

/// Operation counters for an LMDB store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LmdbStoreStats {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

/// LMDB-backed [`DurableStore`].
///
/// # Example
///
/// ```ignore
/// use folio_storage::cache::{LmdbStore, TieredCache};
/// use folio_core::CacheConfig;
/// use std::sync::Arc;
///
/// let store = Arc::new(LmdbStore::new("/var/lib/folio/cache", 64)?);
/// let cache = TieredCache::new(CacheConfig::from_env(), store)?;
/// ```
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Bytes>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl LmdbStore {
    /// Open (or create) an LMDB store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and never opened
        // twice in the same process for the same path by this type.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Operation counters since the store was opened.
    pub fn stats(&self) -> LmdbStoreStats {
        LmdbStoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Flush the environment to disk.
    pub fn sync(&self) -> Result<(), LmdbStoreError> {
        self.env
            .force_sync()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl DurableStore for LmdbStore {
    async fn read(&self, key: &str) -> FolioResult<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let rtxn = self.env.read_txn().map_err(|e| StoreError::ReadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let bytes = self
            .db
            .get(&rtxn, key)
            .map_err(|e| StoreError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?
            .map(|b| b.to_vec());

        Ok(bytes)
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> FolioResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let write_failed = |e: heed::Error| StoreError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(write_failed)?;
        self.db.put(&mut wtxn, key, bytes).map_err(write_failed)?;
        wtxn.commit().map_err(write_failed)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> FolioResult<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let delete_failed = |e: heed::Error| StoreError::DeleteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(delete_failed)?;
        let deleted = self.db.delete(&mut wtxn, key).map_err(delete_failed)?;
        wtxn.commit().map_err(delete_failed)?;

        Ok(deleted)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> FolioResult<Vec<String>> {
        let scan_failed = |e: heed::Error| StoreError::ScanFailed {
            prefix: prefix.to_string(),
            reason: e.to_string(),
        };

        let rtxn = self.env.read_txn().map_err(scan_failed)?;
        let iter = self.db.prefix_iter(&rtxn, prefix).map_err(scan_failed)?;

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(scan_failed)?;
            keys.push(key.to_string());
        }

        Ok(keys)
    }
}
