//! Folio Core - Shared Types
//!
//! Timestamps, the error taxonomy, cache configuration and the clock
//! abstraction. All other folio crates depend on this.

use chrono::{DateTime, Utc};

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{ConfigError, FetchError, FolioError, FolioResult, StoreError, ValidationError};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Millisecond offset of a timestamp from the Unix epoch.
pub fn timestamp_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

/// Timestamp from a Unix-epoch millisecond offset.
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn timestamp_from_millis(millis: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_millis(millis)
}
