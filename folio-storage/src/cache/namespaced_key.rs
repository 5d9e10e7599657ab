//! Namespace-scoped durable-tier keys.
//!
//! A `NamespacedKey` can only be built with a namespace, so every record the
//! cache writes to a shared durable store lands under its own prefix and
//! `clear()` can remove exactly those records.

use folio_core::constants::NAMESPACE_SEPARATOR;
use folio_core::{FolioError, FolioResult, ValidationError};

/// A caller key bound to a cache namespace.
///
/// # Format
///
/// Encodes to `{namespace}:{key}`. Namespaces may not contain the separator
/// (enforced by `CacheConfig::validate`), so decoding is unambiguous even
/// when the caller key itself contains `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedKey {
    inner: KeyInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    namespace: String,
    key: String,
}

impl NamespacedKey {
    /// Bind `key` to `namespace`.
    ///
    /// Fails when the caller key is empty.
    pub fn new(namespace: &str, key: &str) -> FolioResult<Self> {
        validate_key(key)?;
        Ok(Self {
            inner: KeyInner {
                namespace: namespace.to_string(),
                key: key.to_string(),
            },
        })
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The caller-visible key, without namespace.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Durable-tier representation.
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            self.inner.namespace, NAMESPACE_SEPARATOR, self.inner.key
        )
    }

    /// Prefix shared by every key of `namespace`.
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{}{}", namespace, NAMESPACE_SEPARATOR)
    }
}

impl std::fmt::Display for NamespacedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Reject empty caller keys.
pub fn validate_key(key: &str) -> FolioResult<()> {
    if key.is_empty() {
        return Err(FolioError::Validation(ValidationError::RequiredFieldMissing {
            field: "key".to_string(),
        }));
    }
    Ok(())
}
