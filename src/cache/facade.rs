//! Cache Facade Module
//!
//! Typed entry point for every caller. Owns the TTL policy, key construction,
//! serialization, statistics and health reporting, and routes each operation
//! to the primary store or, while the primary is unreachable, to the fallback.
//!
//! Reads and writes never surface store failures: an unreachable primary
//! engages the fallback, and a failure there reads as a counted miss.
//! `invalidate*` and `health_check` report failures to the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{
    decode_envelope, encode_envelope, CacheKey, CacheStats, Clock, Concept, ConnectionState,
    DecodeError, Freshness, KeyBuilder, KeyValueStore, MemoryStore, RedisSettings, RedisStore,
    StatsRecorder, StoreCommand, StoreReply, SystemClock, TtlPolicy, Universe, UniverseMetadata,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Sector recorded for symbols written without one.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Distinct malformed keys remembered for log deduplication.
const MALFORMED_LOG_CAPACITY: usize = 4096;

// == Health ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of a primary store round-trip probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub connection_state: ConnectionState,
    /// True while operations are being served by the fallback store
    pub fallback_active: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

// == Cache Facade ==
pub struct CacheFacade {
    primary: Arc<dyn KeyValueStore>,
    fallback: Arc<MemoryStore>,
    policy: TtlPolicy,
    keys: KeyBuilder,
    source: String,
    clock: Arc<dyn Clock>,
    stats: StatsRecorder,
    malformed_seen: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for CacheFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFacade")
            .field("primary", &self.primary.name())
            .field("namespace", &self.keys.namespace())
            .field("policy", &self.policy)
            .finish()
    }
}

impl CacheFacade {
    /// Builds a facade over the given stores. Fails when the TTL policy is incomplete or invalid.
    pub fn new(
        primary: Arc<dyn KeyValueStore>,
        fallback: Arc<MemoryStore>,
        policy: TtlPolicy,
        key_prefix: &str,
    ) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            primary,
            fallback,
            policy,
            keys: KeyBuilder::new(key_prefix),
            source: env!("CARGO_PKG_NAME").to_string(),
            clock: Arc::new(SystemClock),
            stats: StatsRecorder::new(),
            malformed_seen: Mutex::new(HashSet::new()),
        })
    }

    /// Replaces the time source used for envelope and universe timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the `metadata.source` written into envelopes.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Builds the production facade: Redis primary, bounded memory fallback.
    ///
    /// A failed initial connection is not fatal; the primary keeps retrying in
    /// the background and the fallback serves requests meanwhile.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let policy = config.ttl_policy()?;
        let redis = RedisStore::new(RedisSettings::from_config(config))?;
        if let Err(e) = redis.connect().await {
            warn!("Starting with fallback store active: {}", e);
        }

        let fallback = Arc::new(MemoryStore::new(config.fallback_max_entries));
        Ok(Self::new(Arc::new(redis), fallback, policy, &config.key_prefix)?
            .with_source(config.cache_source.clone()))
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// The fallback store, for the sweep task.
    pub fn fallback(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.fallback)
    }

    // == Typed Values ==

    /// Writes a value with its concept's policy TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) {
        let ttl = self.policy.ttl(key.concept());
        self.write_envelope(key, value, ttl).await;
    }

    /// Writes a value with an explicit TTL. A zero TTL is ignored.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        if ttl.is_zero() {
            warn!("Ignoring write to {} with zero TTL", key);
            return;
        }
        self.write_envelope(key, value, ttl).await;
    }

    /// Writes market data with the TTL matching the requested freshness.
    pub async fn set_market_data<T: Serialize + ?Sized>(&self, symbol: &str, value: &T, freshness: Freshness) {
        let ttl = self.policy.market_data_ttl(freshness);
        self.write_envelope(&CacheKey::market_data(symbol), value, ttl).await;
    }

    /// Reads a value. Absent, expired, malformed and unreachable all read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw_key = self.keys.key(key);
        let raw = self.route_get(&raw_key).await.unwrap_or_default();

        let value = raw.and_then(|raw| self.decode::<T>(&raw_key, &raw));
        self.count_read(value.is_some());
        value
    }

    /// Reads many keys in one pipelined round-trip. Only present keys appear in the result.
    pub async fn get_batch<T: DeserializeOwned>(&self, keys: &[CacheKey]) -> HashMap<CacheKey, T> {
        let mut found = HashMap::new();
        if keys.is_empty() {
            return found;
        }

        let raw_keys: Vec<String> = keys.iter().map(|k| self.keys.key(k)).collect();
        let commands = raw_keys
            .iter()
            .map(|k| StoreCommand::Get { key: k.clone() })
            .collect();

        let replies = self.route_pipeline(commands).await.unwrap_or_default();

        let mut replies = replies.into_iter();
        for (key, raw_key) in keys.iter().zip(raw_keys.iter()) {
            let raw = match replies.next() {
                Some(StoreReply::Unreadable(reason)) => {
                    self.report_malformed(raw_key, &reason);
                    None
                }
                reply => reply.and_then(StoreReply::into_value),
            };
            let value = raw.and_then(|raw| self.decode::<T>(raw_key, &raw));
            self.count_read(value.is_some());
            if let Some(value) = value {
                found.insert(key.clone(), value);
            }
        }
        found
    }

    // == Score Maps ==

    /// Writes a bucket's scores as one hash keyed by symbol.
    pub async fn set_score_map<T: Serialize>(
        &self,
        algorithm_id: &str,
        timestamp_ms: u64,
        scores: &HashMap<String, T>,
    ) {
        let key = self.keys.score_map(algorithm_id, timestamp_ms);
        let mut fields = Vec::with_capacity(scores.len());
        for (symbol, score) in scores {
            match serde_json::to_string(score) {
                Ok(encoded) => fields.push((symbol.trim().to_uppercase(), encoded)),
                Err(e) => warn!("Skipping score for {} in {}: {}", symbol, key, e),
            }
        }
        if fields.is_empty() {
            debug!("No scores to write for {}", key);
            return;
        }

        let ttl = self.policy.ttl(Concept::StockScores);
        let command = StoreCommand::HashSet { key: key.clone(), fields, ttl };
        if let Err(e) = self.route_pipeline(vec![command]).await {
            debug!("Score map write to {} dropped: {}", key, e);
        }
    }

    /// Reads a bucket's scores. Malformed fields are skipped; an empty map is a miss.
    pub async fn get_score_map<T: DeserializeOwned>(&self, algorithm_id: &str, timestamp_ms: u64) -> HashMap<String, T> {
        let key = self.keys.score_map(algorithm_id, timestamp_ms);
        let fields = self.route_hash_get_all(&key).await.unwrap_or_default();

        let mut scores = HashMap::with_capacity(fields.len());
        for (symbol, raw) in fields {
            match serde_json::from_str::<T>(&raw) {
                Ok(score) => {
                    scores.insert(symbol, score);
                }
                Err(e) => self.report_malformed(&format!("{}#{}", key, symbol), &e.to_string()),
            }
        }
        self.count_read(!scores.is_empty());
        scores
    }

    // == Universes ==

    /// Replaces an algorithm's universe. Set and metadata are written in one
    /// atomic pipeline with the same TTL.
    pub async fn set_universe<S: AsRef<str>>(
        &self,
        algorithm_id: &str,
        symbols: &[S],
        sectors: Option<&HashMap<String, String>>,
    ) {
        let members: BTreeSet<String> = symbols
            .iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let metadata = UniverseMetadata {
            count: members.len(),
            sector_breakdown: sector_breakdown(&members, sectors),
            updated_at: self.clock.now_ms(),
        };
        let meta_json = match serde_json::to_string(&metadata) {
            Ok(json) => json,
            Err(e) => {
                warn!("Universe metadata for {} not encodable: {}", algorithm_id, e);
                return;
            }
        };

        let set_key = self.keys.universe(algorithm_id);
        let ttl = self.policy.ttl(Concept::Universe);
        let mut commands = vec![StoreCommand::Del { key: set_key.clone() }];
        if !members.is_empty() {
            commands.push(StoreCommand::SetAdd {
                key: set_key,
                members: members.into_iter().collect(),
                ttl,
            });
        }
        commands.push(StoreCommand::SetWithExpiry {
            key: self.keys.universe_meta(algorithm_id),
            value: meta_json,
            ttl,
        });

        if let Err(e) = self.route_pipeline(commands).await {
            debug!("Universe write for {} dropped: {}", algorithm_id, e);
        }
    }

    /// Reads an algorithm's universe. Missing halves or a count mismatch read as `None`.
    pub async fn get_universe(&self, algorithm_id: &str) -> Option<Universe> {
        let meta_key = self.keys.universe_meta(algorithm_id);
        let commands = vec![
            StoreCommand::SetMembers {
                key: self.keys.universe(algorithm_id),
            },
            StoreCommand::Get { key: meta_key.clone() },
        ];

        let universe = match self.route_pipeline(commands).await {
            Ok(replies) => self.assemble_universe(&meta_key, replies),
            Err(_) => None,
        };
        self.count_read(universe.is_some());
        universe
    }

    /// Membership test. False unless the universe's metadata is present too.
    pub async fn universe_contains(&self, algorithm_id: &str, symbol: &str) -> bool {
        let commands = vec![
            StoreCommand::SetIsMember {
                key: self.keys.universe(algorithm_id),
                member: symbol.trim().to_uppercase(),
            },
            StoreCommand::Get {
                key: self.keys.universe_meta(algorithm_id),
            },
        ];

        let present = match self.route_pipeline(commands).await {
            Ok(replies) => {
                let mut replies = replies.into_iter();
                let member = matches!(replies.next(), Some(StoreReply::Bool(true)));
                let has_meta = replies.next().and_then(StoreReply::into_value).is_some();
                member && has_meta
            }
            Err(_) => false,
        };
        self.count_read(present);
        present
    }

    fn assemble_universe(&self, meta_key: &str, replies: Vec<StoreReply>) -> Option<Universe> {
        let mut replies = replies.into_iter();
        let mut symbols = replies.next()?.into_members();
        let raw_meta = replies.next()?.into_value()?;

        let metadata: UniverseMetadata = match serde_json::from_str(&raw_meta) {
            Ok(metadata) => metadata,
            Err(e) => {
                self.report_malformed(meta_key, &e.to_string());
                return None;
            }
        };
        if symbols.len() != metadata.count {
            warn!(
                "Universe {} has {} members but metadata says {}, treating as absent",
                meta_key,
                symbols.len(),
                metadata.count
            );
            return None;
        }

        symbols.sort();
        Some(Universe { symbols, metadata })
    }

    // == Invalidation ==

    /// Removes every key matching a glob pattern relative to the namespace,
    /// e.g. `algo:123:*`. Returns the number of keys removed.
    ///
    /// Matching fallback entries are always cleared; primary failures are returned.
    pub async fn invalidate(&self, pattern: &str) -> Result<u64> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern("pattern must not be empty".into()));
        }

        let full = self.keys.pattern(pattern);
        let stale = self.fallback.keys_matching(&full).await?;
        let mut removed = self.fallback.del(&stale).await?;

        let matched = self.primary.keys_matching(&full).await?;
        removed += self.primary.del(&matched).await?;

        info!("Invalidated {} key(s) matching {}", removed, full);
        Ok(removed)
    }

    /// Removes everything written for one algorithm.
    pub async fn invalidate_algorithm(&self, algorithm_id: &str) -> Result<u64> {
        self.invalidate(&KeyBuilder::algorithm_pattern(algorithm_id)).await
    }

    /// Removes everything written for one symbol across concepts.
    pub async fn invalidate_symbol(&self, symbol: &str) -> Result<u64> {
        let mut removed = 0;
        for pattern in KeyBuilder::symbol_patterns(symbol) {
            removed += self.invalidate(&pattern).await?;
        }
        Ok(removed)
    }

    // == Observability ==

    pub async fn statistics(&self) -> CacheStats {
        let mut stats = self.stats.snapshot();
        stats.fallback_entries = self.fallback.len().await;
        stats.fallback_evictions = self.fallback.evictions().await;
        stats
    }

    /// Clears counters. Stored data is untouched.
    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    /// Pings the primary store, restarting its reconnect loop if it gave up.
    pub async fn health_check(&self) -> HealthReport {
        if self.primary.connection_state() == ConnectionState::Disconnected {
            self.primary.recover();
        }
        let started = Instant::now();
        match self.primary.ping().await {
            Ok(latency) => HealthReport {
                status: HealthStatus::Healthy,
                latency_ms: latency.as_millis() as u64,
                error: None,
                connection_state: self.primary.connection_state(),
                fallback_active: false,
            },
            Err(e) => HealthReport {
                status: HealthStatus::Unhealthy,
                latency_ms: started.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
                connection_state: self.primary.connection_state(),
                fallback_active: true,
            },
        }
    }

    /// Releases the primary store connection.
    pub async fn shutdown(&self) {
        self.primary.close().await;
    }

    // == Routing ==

    /// Also restarts reconnecting when the primary has given up.
    fn primary_reachable(&self) -> bool {
        let available = self.primary.is_available();
        if !available {
            self.primary.recover();
        }
        available
    }

    fn note_primary_failure(&self, op: &str, key: &str, err: &CacheError) {
        self.stats.record_primary_error();
        warn!(
            "{} {} on {} failed ({}), using fallback store",
            op,
            key,
            self.primary.name(),
            err
        );
    }

    fn note_store_error(&self, store: &str, op: &str, key: &str, err: &CacheError) {
        warn!("{} {} on {} store failed: {}", op, key, store, err);
    }

    async fn route_get(&self, key: &str) -> Result<Option<String>> {
        if self.primary_reachable() {
            match self.primary.get(key).await {
                Err(e) if e.is_unreachable() => self.note_primary_failure("GET", key, &e),
                Err(e) => {
                    self.note_store_error(self.primary.name(), "GET", key, &e);
                    return Err(e);
                }
                ok => return ok,
            }
        }
        self.stats.record_fallback();
        self.fallback
            .get(key)
            .await
            .inspect_err(|e| self.note_store_error(self.fallback.name(), "GET", key, e))
    }

    async fn route_set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if self.primary_reachable() {
            match self.primary.set_with_expiry(key, value, ttl).await {
                Err(e) if e.is_unreachable() => self.note_primary_failure("SET", key, &e),
                Err(e) => {
                    self.note_store_error(self.primary.name(), "SET", key, &e);
                    return Err(e);
                }
                ok => return ok,
            }
        }
        self.stats.record_fallback();
        self.fallback
            .set_with_expiry(key, value, ttl)
            .await
            .inspect_err(|e| self.note_store_error(self.fallback.name(), "SET", key, e))
    }

    async fn route_hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        if self.primary_reachable() {
            match self.primary.hash_get_all(key).await {
                Err(e) if e.is_unreachable() => self.note_primary_failure("HGETALL", key, &e),
                Err(e) => {
                    self.note_store_error(self.primary.name(), "HGETALL", key, &e);
                    return Err(e);
                }
                ok => return ok,
            }
        }
        self.stats.record_fallback();
        self.fallback
            .hash_get_all(key)
            .await
            .inspect_err(|e| self.note_store_error(self.fallback.name(), "HGETALL", key, e))
    }

    async fn route_pipeline(&self, commands: Vec<StoreCommand>) -> Result<Vec<StoreReply>> {
        let label = format!("{} command(s)", commands.len());
        if self.primary_reachable() {
            match self.primary.pipeline(commands.clone()).await {
                Err(e) if e.is_unreachable() => self.note_primary_failure("PIPELINE", &label, &e),
                Err(e) => {
                    self.note_store_error(self.primary.name(), "PIPELINE", &label, &e);
                    return Err(e);
                }
                ok => return ok,
            }
        }
        self.stats.record_fallback();
        self.fallback
            .pipeline(commands)
            .await
            .inspect_err(|e| self.note_store_error(self.fallback.name(), "PIPELINE", &label, e))
    }

    // == Encoding ==

    async fn write_envelope<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let payload = match encode_envelope(value, self.clock.now_ms(), &self.source) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Value for {} not encodable, skipping write: {}", key, e);
                return;
            }
        };

        let raw_key = self.keys.key(key);
        if let Err(e) = self.route_set(&raw_key, &payload, ttl).await {
            debug!("Write to {} dropped: {}", raw_key, e);
        }
    }

    fn decode<T: DeserializeOwned>(&self, raw_key: &str, raw: &str) -> Option<T> {
        match decode_envelope::<T>(raw) {
            Ok(envelope) => Some(envelope.data),
            Err(DecodeError::Malformed(reason)) => {
                self.report_malformed(raw_key, &reason);
                None
            }
            Err(DecodeError::VersionMismatch(version)) => {
                debug!("Ignoring {} written by namespace version {}", raw_key, version);
                None
            }
        }
    }

    /// Warns once per key, then drops to debug.
    fn report_malformed(&self, key: &str, reason: &str) {
        let first = match self.malformed_seen.lock() {
            Ok(mut seen) => {
                if seen.len() >= MALFORMED_LOG_CAPACITY {
                    seen.clear();
                }
                seen.insert(key.to_string())
            }
            Err(_) => true,
        };

        if first {
            warn!("Malformed cache payload at {}, treating as miss: {}", key, reason);
        } else {
            debug!("Malformed cache payload at {} again: {}", key, reason);
        }
    }

    fn count_read(&self, hit: bool) {
        if hit {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
    }
}

fn sector_breakdown(
    members: &BTreeSet<String>,
    sectors: Option<&HashMap<String, String>>,
) -> BTreeMap<String, usize> {
    let mut breakdown = BTreeMap::new();
    let Some(sectors) = sectors else {
        return breakdown;
    };

    let by_symbol: HashMap<String, &str> = sectors
        .iter()
        .map(|(symbol, sector)| (symbol.trim().to_uppercase(), sector.as_str()))
        .collect();
    for symbol in members {
        let sector = by_symbol.get(symbol).copied().unwrap_or(UNKNOWN_SECTOR);
        *breakdown.entry(sector.to_string()).or_insert(0) += 1;
    }
    breakdown
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn memory_facade() -> (CacheFacade, Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let primary = Arc::new(MemoryStore::with_clock(100, Arc::new(clock.clone())));
        let fallback = Arc::new(MemoryStore::with_clock(100, Arc::new(clock.clone())));
        let facade = CacheFacade::new(primary.clone(), fallback, TtlPolicy::default(), "test:")
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        (facade, primary, clock)
    }

    #[test]
    fn test_invalid_policy_refused() {
        let policy = TtlPolicy::default().with_ttl(Concept::MarketData, Duration::from_secs(900));
        let result = CacheFacade::new(
            Arc::new(MemoryStore::new(10)),
            Arc::new(MemoryStore::new(10)),
            policy,
            "test:",
        );
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_sector_breakdown_counts_unknown() {
        let members: BTreeSet<String> = ["AAPL", "MSFT", "XOM"].iter().map(|s| s.to_string()).collect();
        let sectors: HashMap<String, String> = [("aapl", "Technology"), ("MSFT", "Technology")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let breakdown = sector_breakdown(&members, Some(&sectors));
        assert_eq!(breakdown.get("Technology"), Some(&2));
        assert_eq!(breakdown.get(UNKNOWN_SECTOR), Some(&1));
        assert!(sector_breakdown(&members, None).is_empty());
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let (facade, _, _) = memory_facade();
        let key = CacheKey::factors("aapl");
        facade.set(&key, &vec![1.5, 2.5]).await;

        let value: Option<Vec<f64>> = facade.get(&key).await;
        assert_eq!(value, Some(vec![1.5, 2.5]));
    }

    #[tokio::test]
    async fn test_zero_ttl_write_is_noop() {
        let (facade, primary, _) = memory_facade();
        facade
            .set_with_ttl(&CacheKey::factors("AAPL"), &1, Duration::ZERO)
            .await;
        assert!(primary.is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_type_reads_as_miss() {
        let (facade, _, _) = memory_facade();
        let key = CacheKey::configuration("momentum-v1");
        facade.set(&key, "not a number").await;

        let value: Option<u64> = facade.get(&key).await;
        assert_eq!(value, None);
        assert_eq!(facade.statistics().await.misses, 1);
    }

    #[tokio::test]
    async fn test_score_map_round_trip_and_expiry() {
        let (facade, _, clock) = memory_facade();
        let ts = 1_700_000_030_000;
        let scores: HashMap<String, f64> =
            [("aapl".to_string(), 0.9), ("MSFT".to_string(), 0.7)].into_iter().collect();
        facade.set_score_map("momentum-v1", ts, &scores).await;

        let read: HashMap<String, f64> = facade.get_score_map("momentum-v1", ts).await;
        assert_eq!(read.get("AAPL"), Some(&0.9));
        assert_eq!(read.len(), 2);

        clock.advance(Duration::from_secs(301));
        let read: HashMap<String, f64> = facade.get_score_map("momentum-v1", ts).await;
        assert!(read.is_empty());
    }

    #[tokio::test]
    async fn test_universe_replaced_not_merged() {
        let (facade, _, _) = memory_facade();
        facade.set_universe("alpha", &["AAPL", "MSFT"], None).await;
        facade.set_universe("alpha", &["NVDA"], None).await;

        let universe = facade.get_universe("alpha").await.unwrap();
        assert_eq!(universe.symbols, vec!["NVDA".to_string()]);
        assert_eq!(universe.metadata.count, 1);
        assert!(!facade.universe_contains("alpha", "AAPL").await);
    }

    #[tokio::test]
    async fn test_universe_without_metadata_is_absent() {
        let (facade, primary, _) = memory_facade();
        facade.set_universe("alpha", &["AAPL"], None).await;
        primary
            .del(&[facade.keys().universe_meta("alpha")])
            .await
            .unwrap();

        assert!(facade.get_universe("alpha").await.is_none());
        assert!(!facade.universe_contains("alpha", "AAPL").await);
    }

    #[tokio::test]
    async fn test_empty_universe_reads_back_empty() {
        let (facade, _, _) = memory_facade();
        let none: [&str; 0] = [];
        facade.set_universe("alpha", &none, None).await;

        let universe = facade.get_universe("alpha").await.unwrap();
        assert!(universe.symbols.is_empty());
        assert_eq!(universe.metadata.count, 0);
    }

    #[tokio::test]
    async fn test_empty_pattern_rejected() {
        let (facade, _, _) = memory_facade();
        let err = facade.invalidate("  ").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn test_invalidate_symbol_covers_scores() {
        let (facade, _, _) = memory_facade();
        let ts = 1_700_000_000_000;
        facade.set(&CacheKey::market_data("AAPL"), &1).await;
        facade.set(&CacheKey::stock_score("alpha", "AAPL", ts), &0.5).await;
        facade.set(&CacheKey::stock_score("alpha", "MSFT", ts), &0.4).await;

        assert_eq!(facade.invalidate_symbol("aapl").await.unwrap(), 2);
        assert_eq!(facade.get::<f64>(&CacheKey::stock_score("alpha", "MSFT", ts)).await, Some(0.4));
    }

    #[tokio::test]
    async fn test_command_error_on_primary_skips_fallback() {
        let (facade, primary, _) = memory_facade();
        let key = CacheKey::factors("AAPL");
        primary
            .hash_set(&facade.keys().key(&key), &[("f".into(), "v".into())], Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(facade.get::<u32>(&key).await, None);
        let stats = facade.statistics().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.primary_errors, 0);
        assert_eq!(stats.fallback_operations, 0);
    }

    #[tokio::test]
    async fn test_health_of_reachable_primary() {
        let (facade, _, _) = memory_facade();
        let report = facade.health_check().await;
        assert!(report.is_healthy());
        assert_eq!(report.error, None);
        assert_eq!(report.connection_state, ConnectionState::Connected);
        assert!(!report.fallback_active);
    }
}
