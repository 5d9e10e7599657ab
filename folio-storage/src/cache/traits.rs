//! Durable tier trait.
//!
//! The durable tier is a plain ordered key-value store of opaque bytes. The
//! cache owns the record format and key namespacing; backends only move
//! bytes.

use async_trait::async_trait;
use folio_core::FolioResult;

/// Durable key-value store backing the L2 tier.
///
/// This trait abstracts over different persistence substrates (e.g., LMDB,
/// an in-process map). Implementations must be thread-safe; a single store
/// may be shared by several caches, each confined to its own namespace.
///
/// The cache treats every error from these methods as best-effort: failed
/// reads count as misses and failed writes/deletes are logged and dropped.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the record stored under `key`, if any.
    async fn read(&self, key: &str) -> FolioResult<Option<Vec<u8>>>;

    /// Create or replace the record stored under `key`.
    async fn write(&self, key: &str, bytes: &[u8]) -> FolioResult<()>;

    /// Remove the record stored under `key`.
    ///
    /// Returns true if a record was removed.
    async fn delete(&self, key: &str) -> FolioResult<bool>;

    /// Enumerate every key beginning with `prefix`, in key order.
    async fn keys_with_prefix(&self, prefix: &str) -> FolioResult<Vec<String>>;
}
