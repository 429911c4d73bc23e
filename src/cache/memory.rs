//! Fallback Memory Store Module
//!
//! Process-local store used while the primary store is unreachable. Entries
//! expire lazily on access and through the periodic sweep; capacity is bounded
//! with LRU eviction. Nothing written here is ever copied back to the primary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{
    glob_match, Clock, KeyValueStore, LruTracker, StoreCommand, StoreReply, StoredEntry,
    StoredValue, SystemClock,
};
use crate::error::{CacheError, Result};

fn wrong_type(key: &str) -> CacheError {
    CacheError::InvalidRequest(format!(
        "WRONGTYPE operation against '{}' holding the wrong kind of value",
        key
    ))
}

fn ttl_ms(ttl: Duration) -> u64 {
    ttl.as_millis() as u64
}

// == Memory Inner ==
/// Map plus recency tracking; every method takes the current time explicitly.
#[derive(Debug)]
struct MemoryInner {
    entries: HashMap<String, StoredEntry>,
    lru: LruTracker,
    max_entries: usize,
    evictions: u64,
}

impl MemoryInner {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            max_entries,
            evictions: 0,
        }
    }

    /// Live entry for `key`, dropping it first if it has expired.
    fn live(&mut self, key: &str, now: u64) -> Option<&mut StoredEntry> {
        let expired = self.entries.get(key).map(|e| e.is_expired(now))?;
        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
            return None;
        }
        self.lru.touch(key);
        self.entries.get_mut(key)
    }

    fn insert(&mut self, key: &str, entry: StoredEntry) {
        if !self.entries.contains_key(key) {
            while self.entries.len() >= self.max_entries {
                match self.lru.evict_oldest() {
                    Some(evicted) => {
                        self.entries.remove(&evicted);
                        self.evictions += 1;
                    }
                    None => break,
                }
            }
        }
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        self.entries.remove(key).is_some()
    }

    fn get(&mut self, key: &str, now: u64) -> Result<Option<String>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                StoredValue::Text(text) => Ok(Some(text.clone())),
                _ => Err(wrong_type(key)),
            },
        }
    }

    fn set(&mut self, key: &str, value: &str, ttl: Duration, now: u64) {
        let entry = StoredEntry::new(StoredValue::Text(value.to_string()), now, Some(ttl_ms(ttl)));
        self.insert(key, entry);
    }

    fn del(&mut self, keys: &[String], now: u64) -> u64 {
        keys.iter()
            .filter(|key| {
                let live = self.live(key, now).is_some();
                self.remove(key) && live
            })
            .count() as u64
    }

    fn hash_set(&mut self, key: &str, fields: &[(String, String)], ttl: Duration, now: u64) -> Result<()> {
        let expires_at = Some(now.saturating_add(ttl_ms(ttl)));
        if let Some(entry) = self.live(key, now) {
            let StoredValue::Hash(map) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            map.extend(fields.iter().cloned());
            entry.expires_at = expires_at;
            return Ok(());
        }

        let map: HashMap<String, String> = fields.iter().cloned().collect();
        self.insert(key, StoredEntry::new(StoredValue::Hash(map), now, Some(ttl_ms(ttl))));
        Ok(())
    }

    fn hash_get_all(&mut self, key: &str, now: u64) -> Result<HashMap<String, String>> {
        match self.live(key, now) {
            None => Ok(HashMap::new()),
            Some(entry) => match &entry.value {
                StoredValue::Hash(map) => Ok(map.clone()),
                _ => Err(wrong_type(key)),
            },
        }
    }

    fn set_add(&mut self, key: &str, members: &[String], ttl: Duration, now: u64) -> Result<()> {
        let expires_at = Some(now.saturating_add(ttl_ms(ttl)));
        if let Some(entry) = self.live(key, now) {
            let StoredValue::Set(set) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            set.extend(members.iter().cloned());
            entry.expires_at = expires_at;
            return Ok(());
        }

        let set: HashSet<String> = members.iter().cloned().collect();
        self.insert(key, StoredEntry::new(StoredValue::Set(set), now, Some(ttl_ms(ttl))));
        Ok(())
    }

    fn set_members(&mut self, key: &str, now: u64) -> Result<Vec<String>> {
        match self.live(key, now) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                StoredValue::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(wrong_type(key)),
            },
        }
    }

    fn set_is_member(&mut self, key: &str, member: &str, now: u64) -> Result<bool> {
        match self.live(key, now) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                StoredValue::Set(set) => Ok(set.contains(member)),
                _ => Err(wrong_type(key)),
            },
        }
    }

    fn apply(&mut self, command: StoreCommand, now: u64) -> Result<StoreReply> {
        let reply = match command {
            StoreCommand::Get { key } => match self.get(&key, now) {
                Ok(value) => StoreReply::Value(value),
                Err(e) => StoreReply::Unreadable(e.to_string()),
            },
            StoreCommand::SetWithExpiry { key, value, ttl } => {
                self.set(&key, &value, ttl, now);
                StoreReply::Ok
            }
            StoreCommand::Del { key } => StoreReply::Count(self.del(&[key], now)),
            StoreCommand::HashSet { key, fields, ttl } => {
                self.hash_set(&key, &fields, ttl, now)?;
                StoreReply::Ok
            }
            StoreCommand::HashGetAll { key } => StoreReply::Hash(self.hash_get_all(&key, now)?),
            StoreCommand::SetAdd { key, members, ttl } => {
                self.set_add(&key, &members, ttl, now)?;
                StoreReply::Ok
            }
            StoreCommand::SetMembers { key } => StoreReply::Members(self.set_members(&key, now)?),
            StoreCommand::SetIsMember { key, member } => {
                StoreReply::Bool(self.set_is_member(&key, &member, now)?)
            }
        };
        Ok(reply)
    }

    fn keys_matching(&self, pattern: &str, now: u64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn sweep_expired(&mut self, now: u64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

// == Memory Store ==
/// In-process fallback store. Not shared across processes.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates a store holding at most `max_entries` keys, on wall-clock time.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(MemoryInner::new(max_entries.max(1))),
            clock,
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Removes every expired entry, returning how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.now();
        self.inner.write().await.sweep_expired(now)
    }

    /// Number of stored keys, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries dropped to stay within capacity.
    pub async fn evictions(&self) -> u64 {
        self.inner.read().await.evictions
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.now();
        self.inner.write().await.get(key, now)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.pipeline(vec![StoreCommand::SetWithExpiry {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        }])
        .await
        .map(|_| ())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let now = self.now();
        Ok(self.inner.write().await.del(keys, now))
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Result<Vec<StoreReply>> {
        for command in &commands {
            command.validate()?;
        }

        let now = self.now();
        let mut inner = self.inner.write().await;
        commands
            .into_iter()
            .map(|command| inner.apply(command, now))
            .collect()
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)], ttl: Duration) -> Result<()> {
        self.pipeline(vec![StoreCommand::HashSet {
            key: key.to_string(),
            fields: fields.to_vec(),
            ttl,
        }])
        .await
        .map(|_| ())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let now = self.now();
        self.inner.write().await.hash_get_all(key, now)
    }

    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> Result<()> {
        self.pipeline(vec![StoreCommand::SetAdd {
            key: key.to_string(),
            members: members.to_vec(),
            ttl,
        }])
        .await
        .map(|_| ())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let now = self.now();
        self.inner.write().await.set_members(key, now)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        let now = self.now();
        self.inner.write().await.set_is_member(key, member, now)
    }

    async fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        let _guard = self.inner.read().await;
        Ok(started.elapsed())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let now = self.now();
        Ok(self.inner.read().await.keys_matching(pattern, now))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn store_with_clock(max_entries: usize) -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (MemoryStore::with_clock(max_entries, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _) = store_with_clock(10);
        store.set_with_expiry("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lazy_expiry_before_sweep() {
        let (store, clock) = store_with_clock(10);
        store.set_with_expiry("k", "v", Duration::from_secs(60)).await.unwrap();

        clock.advance(Duration::from_secs(60));

        // Still physically present, logically gone.
        assert_eq!(store.inner.read().await.entries.len(), 1);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (store, clock) = store_with_clock(10);
        store.set_with_expiry("short", "v", Duration::from_secs(1)).await.unwrap();
        store.set_with_expiry("long", "v", Duration::from_secs(10)).await.unwrap();

        clock.advance(Duration::from_secs(2));

        assert_eq!(store.sweep_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let (store, _) = store_with_clock(2);
        let ttl = Duration::from_secs(60);
        store.set_with_expiry("a", "1", ttl).await.unwrap();
        store.set_with_expiry("b", "2", ttl).await.unwrap();
        store.get("a").await.unwrap();
        store.set_with_expiry("c", "3", ttl).await.unwrap();

        assert_eq!(store.get("b").await.unwrap(), None);
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("c").await.unwrap().is_some());
        assert_eq!(store.evictions().await, 1);
    }

    #[tokio::test]
    async fn test_hash_merge_and_expiry() {
        let (store, clock) = store_with_clock(10);
        let ttl = Duration::from_secs(30);
        store
            .hash_set("h", &[("AAPL".into(), "1".into())], ttl)
            .await
            .unwrap();
        store
            .hash_set("h", &[("MSFT".into(), "2".into())], ttl)
            .await
            .unwrap();

        let all = store.hash_get_all("h").await.unwrap();
        assert_eq!(all.len(), 2);

        clock.advance(Duration::from_secs(31));
        assert!(store.hash_get_all("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_operations() {
        let (store, _) = store_with_clock(10);
        store
            .set_add("s", &["AAPL".into(), "MSFT".into()], Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.set_is_member("s", "AAPL").await.unwrap());
        assert!(!store.set_is_member("s", "TSLA").await.unwrap());
        let mut members = store.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[tokio::test]
    async fn test_wrong_type_is_error() {
        let (store, _) = store_with_clock(10);
        store.set_with_expiry("k", "v", Duration::from_secs(60)).await.unwrap();
        assert!(store.set_members("k").await.is_err());
        assert!(store.hash_get_all("k").await.is_err());
    }

    #[tokio::test]
    async fn test_pipeline_preserves_order() {
        let (store, _) = store_with_clock(10);
        let ttl = Duration::from_secs(60);
        let replies = store
            .pipeline(vec![
                StoreCommand::SetWithExpiry { key: "a".into(), value: "1".into(), ttl },
                StoreCommand::Get { key: "missing".into() },
                StoreCommand::Get { key: "a".into() },
                StoreCommand::Del { key: "a".into() },
            ])
            .await
            .unwrap();

        assert_eq!(
            replies,
            vec![
                StoreReply::Ok,
                StoreReply::Value(None),
                StoreReply::Value(Some("1".into())),
                StoreReply::Count(1),
            ]
        );
    }

    #[tokio::test]
    async fn test_pipeline_get_on_wrong_type_spoils_only_its_slot() {
        let (store, _) = store_with_clock(10);
        let ttl = Duration::from_secs(60);
        store.set_with_expiry("a", "1", ttl).await.unwrap();
        store.hash_set("h", &[("f".into(), "v".into())], ttl).await.unwrap();

        let replies = store
            .pipeline(vec![
                StoreCommand::Get { key: "a".into() },
                StoreCommand::Get { key: "h".into() },
            ])
            .await
            .unwrap();

        assert_eq!(replies[0], StoreReply::Value(Some("1".into())));
        assert!(matches!(replies[1], StoreReply::Unreadable(_)));
    }

    #[tokio::test]
    async fn test_pipeline_rejects_invalid_command_before_applying() {
        let (store, _) = store_with_clock(10);
        let result = store
            .pipeline(vec![
                StoreCommand::SetWithExpiry {
                    key: "a".into(),
                    value: "1".into(),
                    ttl: Duration::from_secs(60),
                },
                StoreCommand::SetAdd {
                    key: "s".into(),
                    members: vec![],
                    ttl: Duration::from_secs(60),
                },
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_matching_skips_expired() {
        let (store, clock) = store_with_clock(10);
        store.set_with_expiry("algo:1:a", "v", Duration::from_secs(1)).await.unwrap();
        store.set_with_expiry("algo:1:b", "v", Duration::from_secs(60)).await.unwrap();
        store.set_with_expiry("algo:2:a", "v", Duration::from_secs(60)).await.unwrap();

        clock.advance(Duration::from_secs(2));

        let keys = store.keys_matching("algo:1:*").await.unwrap();
        assert_eq!(keys, vec!["algo:1:b".to_string()]);
    }

    #[tokio::test]
    async fn test_del_counts_live_keys_only() {
        let (store, clock) = store_with_clock(10);
        store.set_with_expiry("a", "v", Duration::from_secs(1)).await.unwrap();
        store.set_with_expiry("b", "v", Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(5));

        let removed = store
            .del(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.is_empty().await);
    }
}
