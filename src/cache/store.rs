//! Store Module
//!
//! The minimal key-value contract both the primary and the fallback store fulfil.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Connection State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
}

impl ConnectionState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

// == Pipeline Commands ==
/// One command inside a pipelined batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    Get { key: String },
    SetWithExpiry { key: String, value: String, ttl: Duration },
    Del { key: String },
    /// Writes every field, then sets the key's expiry.
    HashSet { key: String, fields: Vec<(String, String)>, ttl: Duration },
    HashGetAll { key: String },
    /// Adds every member, then sets the key's expiry.
    SetAdd { key: String, members: Vec<String>, ttl: Duration },
    SetMembers { key: String },
    SetIsMember { key: String, member: String },
}

impl StoreCommand {
    /// Rejects commands the store cannot express (empty writes, zero TTLs).
    pub fn validate(&self) -> Result<()> {
        match self {
            StoreCommand::SetWithExpiry { key, ttl, .. } => ensure_ttl(key, *ttl),
            StoreCommand::HashSet { key, fields, ttl } => {
                if fields.is_empty() {
                    return Err(CacheError::InvalidRequest(format!(
                        "hash write to '{}' has no fields",
                        key
                    )));
                }
                ensure_ttl(key, *ttl)
            }
            StoreCommand::SetAdd { key, members, ttl } => {
                if members.is_empty() {
                    return Err(CacheError::InvalidRequest(format!(
                        "set write to '{}' has no members",
                        key
                    )));
                }
                ensure_ttl(key, *ttl)
            }
            _ => Ok(()),
        }
    }
}

fn ensure_ttl(key: &str, ttl: Duration) -> Result<()> {
    if ttl_seconds(ttl) == 0 {
        return Err(CacheError::InvalidRequest(format!(
            "expiry for '{}' must be at least one second",
            key
        )));
    }
    Ok(())
}

/// Whole seconds, rounding sub-second remainders up.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Result of one pipelined command, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreReply {
    Ok,
    Value(Option<String>),
    Hash(HashMap<String, String>),
    Members(Vec<String>),
    Bool(bool),
    Count(u64),
    /// A `Get` slot whose key holds something other than a text value.
    Unreadable(String),
}

impl StoreReply {
    pub fn into_value(self) -> Option<String> {
        match self {
            StoreReply::Value(v) => v,
            _ => None,
        }
    }

    pub fn into_members(self) -> Vec<String> {
        match self {
            StoreReply::Members(m) => m,
            _ => Vec::new(),
        }
    }
}

// == Key-Value Store ==
/// Operations the cache facade needs from a store.
///
/// Pipelines return one reply per command in submission order and are applied
/// atomically.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store name for logs and health output.
    fn name(&self) -> &'static str;

    /// False while the store cannot serve requests (e.g. reconnecting).
    fn is_available(&self) -> bool;

    fn connection_state(&self) -> ConnectionState {
        if self.is_available() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Restarts connection attempts if the store gave up reconnecting.
    /// Must be called from within a tokio runtime.
    fn recover(&self) {}

    /// Releases the connection, if the store has one.
    async fn close(&self) {}

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Deletes keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Result<Vec<StoreReply>>;

    async fn hash_set(&self, key: &str, fields: &[(String, String)], ttl: Duration) -> Result<()>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool>;

    /// Round-trip latency probe.
    async fn ping(&self) -> Result<Duration>;

    /// Keys matching a glob pattern. O(N) in the key count; administrative use only.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;
}
