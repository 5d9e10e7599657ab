//! Tagged results for cache reads.
//!
//! A read never fails because a tier failed. Instead it reports what it was
//! able to serve: a valid value, a stale value standing in for a failed
//! fetch, nothing because remote fetch is disabled, or nothing because the
//! fetch failed. Callers can tell "legitimately empty" from "something went
//! wrong" without an error path.

use folio_core::{FetchError, Timestamp};

/// Tier a value was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// In-process map (L1).
    Memory,
    /// Durable key-value store (L2).
    Durable,
    /// Caller-supplied fetch (L3).
    Remote,
}

/// A value copy returned by the cache, with where and when it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    cached_at: Timestamp,
    tier: Tier,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, cached_at: Timestamp, tier: Tier) -> Self {
        Self {
            value,
            cached_at,
            tier,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the value was fetched (or explicitly set).
    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            tier: self.tier,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Result of [`TieredCache::get`](super::TieredCache::get).
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome<T> {
    /// Valid value from memory, durable tier, or a fresh fetch.
    Hit(CacheRead<T>),
    /// Fetch failed or was disabled; an expired durable-tier value was served.
    StaleHit {
        read: CacheRead<T>,
        reason: FetchError,
    },
    /// Nothing cached and remote fetch is disabled.
    Miss,
    /// Nothing cached and the fetch failed.
    Failed(FetchError),
}

impl<T> CacheOutcome<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleHit { .. })
    }

    /// True when no value is available.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Miss | Self::Failed(_))
    }

    /// The read, for `Hit` and `StaleHit`.
    pub fn read(&self) -> Option<&CacheRead<T>> {
        match self {
            Self::Hit(read) | Self::StaleHit { read, .. } => Some(read),
            Self::Miss | Self::Failed(_) => None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.read().map(CacheRead::value)
    }

    /// Tier that served the value, if any.
    pub fn tier(&self) -> Option<Tier> {
        self.read().map(CacheRead::tier)
    }

    /// The fetch failure behind a `StaleHit` or `Failed` outcome.
    pub fn failure(&self) -> Option<&FetchError> {
        match self {
            Self::StaleHit { reason, .. } | Self::Failed(reason) => Some(reason),
            Self::Hit(_) | Self::Miss => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Hit(read) | Self::StaleHit { read, .. } => Some(read.into_value()),
            Self::Miss | Self::Failed(_) => None,
        }
    }

    /// The value, or `T::default()` when nothing is available.
    pub fn into_value_or_default(self) -> T
    where
        T: Default,
    {
        self.into_value().unwrap_or_default()
    }

    pub fn map<U, F>(self, f: F) -> CacheOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Hit(read) => CacheOutcome::Hit(read.map(f)),
            Self::StaleHit { read, reason } => CacheOutcome::StaleHit {
                read: read.map(f),
                reason,
            },
            Self::Miss => CacheOutcome::Miss,
            Self::Failed(reason) => CacheOutcome::Failed(reason),
        }
    }
}
