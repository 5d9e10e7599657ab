//! Default values shared by configuration and the cache.

/// Default namespace prefix for durable-tier keys.
pub const DEFAULT_CACHE_NAMESPACE: &str = "folio_cache";

/// Separator between namespace and caller key in durable-tier keys.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Lifetime applied when a read does not specify a TTL (5 minutes).
pub const DEFAULT_TTL_SECS: u64 = 5 * 60;

/// Absolute ceiling on entry age regardless of TTL (24 hours).
pub const DEFAULT_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Cadence of the expired-entry sweep (10 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;

/// Upper bound on a single remote fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
