//! Cache Entry Module
//!
//! Serialized payload envelope, universe metadata, and the fallback store's entries.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cache::KEY_NAMESPACE_VERSION;
use crate::error::Result;

// == Envelope ==
/// Provenance written alongside every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub source: String,
    pub version: u32,
}

/// JSON envelope stored for string-valued entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    /// Unix milliseconds at write time
    pub cached_at: u64,
    pub metadata: EntryMetadata,
}

/// Encodes a payload into its envelope.
pub fn encode_envelope<T: Serialize + ?Sized>(data: &T, cached_at: u64, source: &str) -> Result<String> {
    let envelope = EnvelopeRef {
        data,
        cached_at,
        metadata: EntryMetadata {
            source: source.to_string(),
            version: KEY_NAMESPACE_VERSION,
        },
    };
    Ok(serde_json::to_string(&envelope)?)
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    data: &'a T,
    cached_at: u64,
    metadata: EntryMetadata,
}

/// Why a stored payload could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Malformed(String),
    VersionMismatch(u32),
}

/// Decodes an envelope. Anything unusable is reported, never panics.
pub fn decode_envelope<T: DeserializeOwned>(raw: &str) -> std::result::Result<Envelope<T>, DecodeError> {
    let envelope: Envelope<T> =
        serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if envelope.metadata.version != KEY_NAMESPACE_VERSION {
        return Err(DecodeError::VersionMismatch(envelope.metadata.version));
    }
    Ok(envelope)
}

// == Universe Metadata ==
/// Record written next to a universe set, with the same TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseMetadata {
    pub count: usize,
    pub sector_breakdown: BTreeMap<String, usize>,
    /// Unix milliseconds at write time
    pub updated_at: u64,
}

/// A universe read back from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Universe {
    pub symbols: Vec<String>,
    pub metadata: UniverseMetadata,
}

// == Fallback Entries ==
/// Value kinds the fallback store can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Text(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

/// A single fallback store entry.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub value: StoredValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    pub fn new(value: StoredValue, now_ms: u64, ttl_ms: Option<u64>) -> Self {
        Self {
            value,
            created_at: now_ms,
            expires_at: ttl_ms.map(|ttl| now_ms.saturating_add(ttl)),
        }
    }

    /// Expired once `now >= expires_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }
}
