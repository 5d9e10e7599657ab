//! Durable-tier record codec.
//!
//! # Binary Format
//!
//! - Bytes 0-7: `created_at` as Unix millis (i64, little endian)
//! - Bytes 8-15: `ttl` in millis (u64, little endian)
//! - Byte 16: origin discriminant
//! - Bytes 17..: JSON-encoded value

use std::time::Duration;

use folio_core::{timestamp_from_millis, timestamp_millis, FolioResult, StoreError};
use serde_json::Value;

use super::entry::{CacheEntry, Origin};

/// Size of the fixed header preceding the JSON payload.
pub const HEADER_LEN: usize = 17;

/// Serialize an entry for the durable tier.
pub fn encode(key: &str, entry: &CacheEntry<Value>) -> FolioResult<Vec<u8>> {
    let payload = serde_json::to_vec(&entry.value).map_err(|e| StoreError::WriteFailed {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    let ttl_millis = u64::try_from(entry.ttl.as_millis()).unwrap_or(u64::MAX);

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&timestamp_millis(entry.created_at).to_le_bytes());
    bytes.extend_from_slice(&ttl_millis.to_le_bytes());
    bytes.push(entry.origin.to_byte());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Parse a durable-tier record.
pub fn decode(key: &str, bytes: &[u8]) -> FolioResult<CacheEntry<Value>> {
    let corrupt = |reason: String| StoreError::CorruptRecord {
        key: key.to_string(),
        reason,
    };

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!(
            "record is {} bytes, header needs {}",
            bytes.len(),
            HEADER_LEN
        ))
        .into());
    }

    let created_millis = i64::from_le_bytes(
        bytes[0..8]
            .try_into()
            .map_err(|_| corrupt("invalid timestamp".to_string()))?,
    );
    let created_at = timestamp_from_millis(created_millis)
        .ok_or_else(|| corrupt(format!("timestamp {} out of range", created_millis)))?;

    let ttl_millis = u64::from_le_bytes(
        bytes[8..16]
            .try_into()
            .map_err(|_| corrupt("invalid ttl".to_string()))?,
    );

    let origin = Origin::from_byte(bytes[16])
        .ok_or_else(|| corrupt(format!("unknown origin byte {:#04x}", bytes[16])))?;

    let value: Value =
        serde_json::from_slice(&bytes[HEADER_LEN..]).map_err(|e| corrupt(e.to_string()))?;

    Ok(CacheEntry::new(
        value,
        created_at,
        Duration::from_millis(ttl_millis),
        origin,
    ))
}
