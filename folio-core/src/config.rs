//! Configuration types

use crate::constants::{
    DEFAULT_CACHE_NAMESPACE, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_AGE_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_TTL_SECS, NAMESPACE_SEPARATOR,
};
use crate::{ConfigError, FolioError, FolioResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a tiered cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Prefix for every durable-tier key written by this cache.
    pub namespace: String,
    /// Lifetime applied when a read does not specify one.
    pub default_ttl: Duration,
    /// Absolute ceiling on entry age, independent of per-entry TTL.
    pub max_age: Duration,
    /// Whether the durable tier (L2) is consulted and written.
    pub enable_durable_tier: bool,
    /// Whether the remote fetch (L3) may be invoked at all.
    pub enable_remote_fetch: bool,
    /// How often the owned sweeper removes invalid entries.
    pub sweep_interval: Duration,
    /// Upper bound on a single remote fetch.
    pub fetch_timeout: Duration,
    /// Coalesce concurrent misses for the same key into one fetch.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
            enable_durable_tier: true,
            enable_remote_fetch: true,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            single_flight: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `FOLIO_CACHE_NAMESPACE`: Durable-tier key prefix (default: folio_cache)
    /// - `FOLIO_CACHE_DEFAULT_TTL_SECS`: Default entry TTL (default: 300)
    /// - `FOLIO_CACHE_MAX_AGE_SECS`: Absolute entry age ceiling (default: 86400)
    /// - `FOLIO_CACHE_ENABLE_DURABLE_TIER`: Use the durable tier (default: true)
    /// - `FOLIO_CACHE_ENABLE_REMOTE_FETCH`: Allow remote fetches (default: true)
    /// - `FOLIO_CACHE_SWEEP_INTERVAL_SECS`: Sweep cadence (default: 600)
    /// - `FOLIO_CACHE_FETCH_TIMEOUT_SECS`: Remote fetch timeout (default: 30)
    /// - `FOLIO_CACHE_SINGLE_FLIGHT`: Coalesce concurrent misses (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            namespace: std::env::var("FOLIO_CACHE_NAMESPACE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.namespace),
            default_ttl: env_secs("FOLIO_CACHE_DEFAULT_TTL_SECS").unwrap_or(defaults.default_ttl),
            max_age: env_secs("FOLIO_CACHE_MAX_AGE_SECS").unwrap_or(defaults.max_age),
            enable_durable_tier: env_flag("FOLIO_CACHE_ENABLE_DURABLE_TIER")
                .unwrap_or(defaults.enable_durable_tier),
            enable_remote_fetch: env_flag("FOLIO_CACHE_ENABLE_REMOTE_FETCH")
                .unwrap_or(defaults.enable_remote_fetch),
            sweep_interval: env_secs("FOLIO_CACHE_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.sweep_interval),
            fetch_timeout: env_secs("FOLIO_CACHE_FETCH_TIMEOUT_SECS")
                .unwrap_or(defaults.fetch_timeout),
            single_flight: env_flag("FOLIO_CACHE_SINGLE_FLIGHT").unwrap_or(defaults.single_flight),
        }
    }

    /// Set the durable-tier namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the absolute max age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Enable or disable the durable tier.
    pub fn with_durable_tier(mut self, enabled: bool) -> Self {
        self.enable_durable_tier = enabled;
        self
    }

    /// Enable or disable remote fetches.
    pub fn with_remote_fetch(mut self, enabled: bool) -> Self {
        self.enable_remote_fetch = enabled;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enable or disable single-flight coalescing.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(FolioError::Config) if invalid.
    ///
    /// Validates:
    /// - namespace is non-empty and free of the key separator
    /// - all duration values are positive
    pub fn validate(&self) -> FolioResult<()> {
        if self.namespace.is_empty() {
            return Err(invalid("namespace", &self.namespace, "namespace must not be empty"));
        }

        if self.namespace.contains(NAMESPACE_SEPARATOR) {
            return Err(invalid(
                "namespace",
                &self.namespace,
                "namespace must not contain the ':' separator",
            ));
        }

        for (field, value) in [
            ("default_ttl", self.default_ttl),
            ("max_age", self.max_age),
            ("sweep_interval", self.sweep_interval),
            ("fetch_timeout", self.fetch_timeout),
        ] {
            if value.is_zero() {
                return Err(invalid(
                    field,
                    &format!("{:?}", value),
                    &format!("{} must be positive", field),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> FolioError {
    FolioError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_lowercase())
        .and_then(|s| match s.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

// =============================================================================
// TESTS
// =============================================================================
