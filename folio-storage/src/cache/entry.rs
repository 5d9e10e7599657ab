//! Cache entries and their provenance.

use std::time::Duration;

use folio_core::Timestamp;
use serde::{Deserialize, Serialize};

/// How the value currently held by an entry was obtained.
///
/// Used for reporting only; eviction never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Origin {
    /// Fetched from the remote source.
    Remote,
    /// Promoted from the durable tier.
    Durable,
    /// Written as a fallback value.
    Fallback,
}

impl Origin {
    /// Single-byte discriminant used by the durable record format.
    pub fn to_byte(self) -> u8 {
        match self {
            Origin::Remote => 0x01,
            Origin::Durable => 0x02,
            Origin::Fallback => 0x03,
        }
    }

    /// Inverse of [`Origin::to_byte`].
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Origin::Remote),
            0x02 => Some(Origin::Durable),
            0x03 => Some(Origin::Fallback),
            _ => None,
        }
    }
}

/// A cached value with its capture time, lifetime and provenance.
///
/// Entries are only ever replaced whole; there are no partial updates.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Timestamp,
    pub ttl: Duration,
    pub origin: Origin,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, created_at: Timestamp, ttl: Duration, origin: Origin) -> Self {
        Self {
            value,
            created_at,
            ttl,
            origin,
        }
    }

    /// Age of the entry at `now`. Entries stamped in the future have age zero.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Valid iff the age is below both the entry TTL and the global ceiling.
    pub fn is_valid(&self, now: Timestamp, max_age: Duration) -> bool {
        let age = self.age(now);
        age < self.ttl && age < max_age
    }

    /// Same entry, retagged.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}
