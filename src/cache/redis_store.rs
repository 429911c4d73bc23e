//! Primary Store Module
//!
//! Redis client wrapper owning the connection lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (on error) Reconnecting -> Connected
//!                                                                    \-> Disconnected (after max retries)
//! ```
//!
//! A store that gave up is put back into `Reconnecting` by `recover()`, which the
//! facade calls whenever it finds the primary unavailable.
//!
//! Callers are never blocked waiting for a reconnect; while the store is not
//! `Connected` every operation fails fast with `CacheError::Unavailable`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::RedisResult;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::store::ttl_seconds;
use crate::cache::{ConnectionState, KeyValueStore, StoreCommand, StoreReply};
use crate::config::Config;
use crate::error::{is_connection_error, CacheError, Result};

/// Longest pause between two reconnect attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Keys per DEL command when invalidating large sets.
const DEL_CHUNK: usize = 512;

// == Settings ==
/// Connection and retry parameters.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
}

impl RedisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.redis_url(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
        }
    }

    /// Linear backoff, capped at `MAX_RECONNECT_DELAY`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base_delay
            .saturating_mul(attempt)
            .min(MAX_RECONNECT_DELAY)
    }
}

// == Redis Inner ==
struct RedisInner {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    state: AtomicU8,
    /// Set by `connect`, cleared by `disconnect`.
    wanted: AtomicBool,
    settings: RedisSettings,
}

impl RedisInner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn open(&self) -> Result<MultiplexedConnection> {
        match tokio::time::timeout(
            self.settings.connect_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(CacheError::Timeout),
        }
    }

    /// Moves `from -> Reconnecting` and starts the single reconnect loop.
    fn begin_reconnect(self: &Arc<Self>, from: ConnectionState) {
        if self.transition(from, ConnectionState::Reconnecting) {
            warn!("Redis connection lost ({}), reconnecting in background", from);
            tokio::spawn(reconnect_loop(Arc::clone(self)));
        }
    }
}

async fn reconnect_loop(inner: Arc<RedisInner>) {
    inner.connection.write().await.take();
    let max_attempts = inner.settings.max_reconnect_attempts;

    for attempt in 1..=max_attempts {
        tokio::time::sleep(inner.settings.reconnect_delay(attempt)).await;
        if inner.state() != ConnectionState::Reconnecting {
            return;
        }

        match inner.open().await {
            Ok(conn) => {
                *inner.connection.write().await = Some(conn);
                if inner.transition(ConnectionState::Reconnecting, ConnectionState::Connected) {
                    info!("Redis reconnected after {} attempt(s)", attempt);
                } else {
                    inner.connection.write().await.take();
                }
                return;
            }
            Err(e) => debug!("Redis reconnect attempt {}/{} failed: {}", attempt, max_attempts, e),
        }
    }

    if inner.transition(ConnectionState::Reconnecting, ConnectionState::Disconnected) {
        warn!(
            "Redis unreachable after {} reconnect attempts, staying disconnected",
            max_attempts
        );
    }
}

// == Redis Store ==
/// Primary store client. Cloning shares the connection.
#[derive(Clone)]
pub struct RedisStore {
    inner: Arc<RedisInner>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("state", &self.state())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl RedisStore {
    /// Creates a client in the `Disconnected` state. No network traffic yet.
    pub fn new(settings: RedisSettings) -> Result<Self> {
        let client = redis::Client::open(settings.url.as_str())?;
        Ok(Self {
            inner: Arc::new(RedisInner {
                client,
                connection: RwLock::new(None),
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                wanted: AtomicBool::new(false),
                settings,
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Opens the connection. On failure the store keeps retrying in the background.
    pub async fn connect(&self) -> Result<()> {
        self.inner.wanted.store(true, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Connecting);
        match self.inner.open().await {
            Ok(conn) => {
                *self.inner.connection.write().await = Some(conn);
                self.inner.set_state(ConnectionState::Connected);
                info!("Connected to Redis");
                Ok(())
            }
            Err(e) => {
                warn!("Initial Redis connection failed: {}", e);
                self.inner.begin_reconnect(ConnectionState::Connecting);
                Err(e)
            }
        }
    }

    /// Drops the connection and stops any reconnect loop.
    pub async fn disconnect(&self) {
        self.inner.wanted.store(false, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Disconnected);
        self.inner.connection.write().await.take();
        info!("Disconnected from Redis");
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(CacheError::Unavailable(format!("redis is {}", state)));
        }
        self.inner
            .connection
            .read()
            .await
            .clone()
            .ok_or_else(|| CacheError::Unavailable("redis connection not established".into()))
    }

    /// Bounds an operation by the command timeout; link failures trigger a reconnect.
    async fn run<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.inner.settings.command_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if is_connection_error(&e) {
                    self.inner.begin_reconnect(ConnectionState::Connected);
                }
                Err(e.into())
            }
            Err(_) => {
                self.inner.begin_reconnect(ConnectionState::Connected);
                Err(CacheError::Timeout)
            }
        }
    }

    /// One MGET; keys holding other types read as nil instead of failing the batch.
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<StoreReply>> {
        let mut conn = self.connection().await?;
        let values: Vec<redis::Value> = self.run(redis::cmd("MGET").arg(keys).query_async(&mut conn)).await?;
        if values.len() != keys.len() {
            return Err(CacheError::Internal(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        Ok(values.iter().map(get_reply).collect())
    }
}

/// Keys of a batch made only of `Get` commands.
fn only_gets(commands: &[StoreCommand]) -> Option<Vec<&str>> {
    commands
        .iter()
        .map(|command| match command {
            StoreCommand::Get { key } => Some(key.as_str()),
            _ => None,
        })
        .collect()
}

fn add_command(pipe: &mut redis::Pipeline, command: &StoreCommand) {
    match command {
        StoreCommand::Get { key } => {
            pipe.cmd("GET").arg(key);
        }
        StoreCommand::SetWithExpiry { key, value, ttl } => {
            pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_seconds(*ttl));
        }
        StoreCommand::Del { key } => {
            pipe.cmd("DEL").arg(key);
        }
        StoreCommand::HashSet { key, fields, ttl } => {
            pipe.cmd("HSET").arg(key);
            for (field, value) in fields {
                pipe.arg(field).arg(value);
            }
            pipe.cmd("EXPIRE").arg(key).arg(ttl_seconds(*ttl)).ignore();
        }
        StoreCommand::HashGetAll { key } => {
            pipe.cmd("HGETALL").arg(key);
        }
        StoreCommand::SetAdd { key, members, ttl } => {
            pipe.cmd("SADD").arg(key).arg(members);
            pipe.cmd("EXPIRE").arg(key).arg(ttl_seconds(*ttl)).ignore();
        }
        StoreCommand::SetMembers { key } => {
            pipe.cmd("SMEMBERS").arg(key);
        }
        StoreCommand::SetIsMember { key, member } => {
            pipe.cmd("SISMEMBER").arg(key).arg(member);
        }
    }
}

fn to_reply(command: &StoreCommand, value: &redis::Value) -> Result<StoreReply> {
    let reply = match command {
        StoreCommand::Get { .. } => get_reply(value),
        StoreCommand::SetWithExpiry { .. }
        | StoreCommand::HashSet { .. }
        | StoreCommand::SetAdd { .. } => StoreReply::Ok,
        StoreCommand::Del { .. } => StoreReply::Count(redis::from_redis_value(value)?),
        StoreCommand::HashGetAll { .. } => StoreReply::Hash(redis::from_redis_value(value)?),
        StoreCommand::SetMembers { .. } => StoreReply::Members(redis::from_redis_value(value)?),
        StoreCommand::SetIsMember { .. } => StoreReply::Bool(redis::from_redis_value(value)?),
    };
    Ok(reply)
}

/// A failed `GET` slot only spoils its own key, never the batch.
fn get_reply(value: &redis::Value) -> StoreReply {
    match redis::from_redis_value::<Option<String>>(value) {
        Ok(text) => StoreReply::Value(text),
        Err(e) => StoreReply::Unreadable(e.to_string()),
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn is_available(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn connection_state(&self) -> ConnectionState {
        self.state()
    }

    fn recover(&self) {
        if self.inner.wanted.load(Ordering::SeqCst) {
            self.inner.begin_reconnect(ConnectionState::Disconnected);
        }
    }

    async fn close(&self) {
        self.disconnect().await;
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = self.run(redis::cmd("GET").arg(key).query_async(&mut conn)).await?;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let command = StoreCommand::SetWithExpiry {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        };
        command.validate()?;

        let mut conn = self.connection().await?;
        let () = self
            .run(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl_seconds(ttl))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection().await?;
        let mut removed = 0u64;
        for chunk in keys.chunks(DEL_CHUNK) {
            let count: u64 = self.run(redis::cmd("DEL").arg(chunk).query_async(&mut conn)).await?;
            removed += count;
        }
        Ok(removed)
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Result<Vec<StoreReply>> {
        for command in &commands {
            command.validate()?;
        }
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(keys) = only_gets(&commands) {
            return self.get_many(&keys).await;
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            add_command(&mut pipe, command);
        }

        let mut conn = self.connection().await?;
        let values: Vec<redis::Value> = self.run(pipe.query_async(&mut conn)).await?;
        if values.len() != commands.len() {
            return Err(CacheError::Internal(format!(
                "pipeline returned {} replies for {} commands",
                values.len(),
                commands.len()
            )));
        }

        commands
            .iter()
            .zip(values.iter())
            .map(|(command, value)| to_reply(command, value))
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
        let mut conn = self.connection().await?;
        let map: HashMap<String, String> =
            self.run(redis::cmd("HGETALL").arg(key).query_async(&mut conn)).await?;
        Ok(map)
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
        let mut conn = self.connection().await?;
        let members: Vec<String> =
            self.run(redis::cmd("SMEMBERS").arg(key).query_async(&mut conn)).await?;
        Ok(members)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let present: bool = self
            .run(redis::cmd("SISMEMBER").arg(key).arg(member).query_async(&mut conn))
            .await?;
        Ok(present)
    }

    async fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        let mut conn = self.connection().await?;
        let _pong: String = self.run(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(started.elapsed())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = self.run(redis::cmd("KEYS").arg(pattern).query_async(&mut conn)).await?;
        Ok(keys)
    }
}
