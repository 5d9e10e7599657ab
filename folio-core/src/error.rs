//! Error types for folio cache operations

use std::time::Duration;
use thiserror::Error;

/// Durable tier errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Read failed for key {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Write failed for key {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Delete failed for key {key}: {reason}")]
    DeleteFailed { key: String, reason: String },

    #[error("Prefix scan failed for {prefix}: {reason}")]
    ScanFailed { prefix: String, reason: String },

    #[error("Corrupt record for key {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Backend error: {reason}")]
    Backend { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Remote fetch errors.
///
/// Cloneable so a single in-flight fetch can report the same failure to
/// every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Fetch for key {key} failed: {reason}")]
    Failed { key: String, reason: String },

    #[error("Fetch for key {key} timed out after {after:?}")]
    TimedOut { key: String, after: Duration },

    #[error("Remote fetch is disabled")]
    RemoteDisabled,

    #[error("Value for key {key} could not be serialized: {reason}")]
    Serialization { key: String, reason: String },
}

impl FetchError {
    /// True when the failure came from configuration rather than the remote source.
    pub fn is_remote_disabled(&self) -> bool {
        matches!(self, Self::RemoteDisabled)
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all folio errors.
#[derive(Debug, Clone, Error)]
pub enum FolioError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for folio operations.
pub type FolioResult<T> = Result<T, FolioError>;

// =============================================================================
// TESTS
// =============================================================================
