//! Cache Module
//!
//! Concept-keyed caching over a Redis primary store with an in-memory fallback,
//! per-concept TTL policy, bucketed time-series keys and pipelined batch reads.

mod clock;
mod concept;
mod entry;
mod facade;
mod keys;
mod lru;
mod memory;
mod redis_store;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use concept::{Concept, Freshness, TtlPolicy, MAX_MARKET_SENSITIVE_TTL, MIN_SLOW_CHANGING_TTL};
pub use entry::{
    decode_envelope, encode_envelope, DecodeError, EntryMetadata, Envelope, StoredEntry,
    StoredValue, Universe, UniverseMetadata,
};
pub use facade::{CacheFacade, HealthReport, HealthStatus, UNKNOWN_SECTOR};
pub use keys::{
    bucket, escape_glob, glob_match, CacheKey, KeyBuilder, KEY_NAMESPACE_VERSION, SCORE_BUCKET_MS,
    SELECTION_BUCKET_MS,
};
pub use lru::LruTracker;
pub use memory::MemoryStore;
pub use redis_store::{RedisSettings, RedisStore, MAX_RECONNECT_DELAY};
pub use stats::{CacheStats, StatsRecorder};
pub use store::{ttl_seconds, ConnectionState, KeyValueStore, StoreCommand, StoreReply};
