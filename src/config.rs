//! Configuration Module
//!
//! Handles loading and validating service configuration from environment variables.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{Concept, TtlPolicy};
use crate::error::{CacheError, Result};

/// Service configuration parameters.
///
/// All values can be configured via environment variables; absent values take
/// defaults, unparsable values are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Primary store host
    pub redis_host: String,
    /// Primary store port
    pub redis_port: u16,
    /// Optional primary store password
    pub redis_password: Option<String>,
    /// Primary store database index
    pub redis_db: u32,
    /// Key prefix; the namespace version is appended by the key builder
    pub key_prefix: String,
    /// `metadata.source` written into every envelope
    pub cache_source: String,
    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-operation timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Backoff step between reconnect attempts in milliseconds
    pub reconnect_base_delay_ms: u64,
    /// Capacity of the fallback store
    pub fallback_max_entries: usize,
    /// Fallback expiry sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Admin HTTP server port
    pub server_port: u16,
    /// Per-concept TTL overrides in seconds
    pub ttl_overrides: Vec<(Concept, u64)>,
    /// Real-time market data TTL override in seconds
    pub real_time_market_data_ttl: Option<u64>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_HOST` (default: 127.0.0.1), `REDIS_PORT` (default: 6379),
    ///   `REDIS_PASSWORD` (optional), `REDIS_DB` (default: 0)
    /// - `CACHE_KEY_PREFIX` (default: `algo:`), `CACHE_SOURCE` (default: `algo-cache`)
    /// - `CONNECT_TIMEOUT_MS` (default: 2000), `COMMAND_TIMEOUT_MS` (default: 1000)
    /// - `MAX_RECONNECT_ATTEMPTS` (default: 10), `RECONNECT_BASE_DELAY_MS` (default: 50)
    /// - `FALLBACK_MAX_ENTRIES` (default: 10000), `SWEEP_INTERVAL_SECS` (default: 30)
    /// - `SERVER_PORT` (default: 3000)
    /// - `CACHE_TTL_<CONCEPT>` and `CACHE_TTL_MARKET_DATA_REALTIME` in seconds
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut ttl_overrides = Vec::new();
        for concept in Concept::ALL {
            let name = format!("CACHE_TTL_{}", concept.env_name());
            if let Some(secs) = parse_optional::<u64, _>(&lookup, &name)? {
                ttl_overrides.push((concept, secs));
            }
        }

        let config = Self {
            redis_host: lookup("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: parse_or(&lookup, "REDIS_PORT", defaults.redis_port)?,
            redis_password: lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()),
            redis_db: parse_or(&lookup, "REDIS_DB", defaults.redis_db)?,
            key_prefix: lookup("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            cache_source: lookup("CACHE_SOURCE").unwrap_or(defaults.cache_source),
            connect_timeout_ms: parse_or(&lookup, "CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms)?,
            command_timeout_ms: parse_or(&lookup, "COMMAND_TIMEOUT_MS", defaults.command_timeout_ms)?,
            max_reconnect_attempts: parse_or(
                &lookup,
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )?,
            reconnect_base_delay_ms: parse_or(
                &lookup,
                "RECONNECT_BASE_DELAY_MS",
                defaults.reconnect_base_delay_ms,
            )?,
            fallback_max_entries: parse_or(&lookup, "FALLBACK_MAX_ENTRIES", defaults.fallback_max_entries)?,
            sweep_interval_secs: parse_or(&lookup, "SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port)?,
            ttl_overrides,
            real_time_market_data_ttl: parse_optional(&lookup, "CACHE_TTL_MARKET_DATA_REALTIME")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.redis_host.trim().is_empty() {
            return Err(CacheError::Config("REDIS_HOST must not be empty".into()));
        }
        if self.redis_port == 0 {
            return Err(CacheError::Config("REDIS_PORT must be non-zero".into()));
        }
        if self.connect_timeout_ms == 0 || self.command_timeout_ms == 0 {
            return Err(CacheError::Config("store timeouts must be non-zero".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(CacheError::Config("SWEEP_INTERVAL_SECS must be non-zero".into()));
        }
        if self.fallback_max_entries == 0 {
            return Err(CacheError::Config("FALLBACK_MAX_ENTRIES must be non-zero".into()));
        }
        Ok(())
    }

    /// Connection URL for the primary store.
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.redis_host,
                self.redis_port,
                self.redis_db
            ),
            None => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }

    /// Default TTL table with the configured overrides applied, validated.
    pub fn ttl_policy(&self) -> Result<TtlPolicy> {
        let mut policy = TtlPolicy::default();
        for (concept, secs) in &self.ttl_overrides {
            policy = policy.with_ttl(*concept, Duration::from_secs(*secs));
        }
        if let Some(secs) = self.real_time_market_data_ttl {
            policy = policy.with_real_time_market_data(Duration::from_secs(secs));
        }

        policy.validate()?;
        Ok(policy)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            redis_password: None,
            redis_db: 0,
            key_prefix: "algo:".to_string(),
            cache_source: "algo-cache".to_string(),
            connect_timeout_ms: 2000,
            command_timeout_ms: 1000,
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 50,
            fallback_max_entries: 10_000,
            sweep_interval_secs: 30,
            server_port: 3000,
            ttl_overrides: Vec::new(),
            real_time_market_data_ttl: None,
        }
    }
}

fn parse_optional<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CacheError::Config(format!("{}={:?} is invalid: {}", name, raw, e))),
    }
}

fn parse_or<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(lookup, name)?.unwrap_or(default))
}
