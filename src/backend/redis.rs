//! Redis cache backend implementation.

use super::CacheBackend;
use crate::error::{Error, Result};
use crate::expiry::{self, Expiry};
use crate::getter::Getter;
use crate::lock::{DistributedLock, LockConfig, LockStore};
use crate::serialization::{self, Payload};
use deadpool_redis::redis::{self, Cmd};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

/// Default Redis connection pool size.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: usize = 16;

/// Default time-to-live for entries written with [`Expiry::Default`].
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// How `add`, `replace` and `set_fields` are made atomic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Atomicity {
    /// Serialize through a `<key>-op` lock token (`SET NX PX`).
    #[default]
    LockToken,
    /// `WATCH` the key and commit with `MULTI`/`EXEC`, retrying when a
    /// concurrent write aborts the transaction. Writes no token key.
    Optimistic,
}

/// Configuration for Redis backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port`, or a full `redis://` / `rediss://` URL used verbatim.
    pub host: String,
    pub password: Option<String>,
    pub db: i64,
    pub pool_size: usize,
    /// Limit for establishing (and recycling) a pooled connection.
    pub connection_timeout: Duration,
    /// Limit for waiting on a free pooled connection.
    pub wait_timeout: Duration,
    /// TTL applied for [`Expiry::Default`]; `None` keeps such entries forever.
    pub default_ttl: Option<Duration>,
    /// Retry budget and lease shared by both atomicity strategies.
    pub lock: LockConfig,
    pub atomicity: Atomicity,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            host: "localhost:6379".to_string(),
            password: None,
            db: 0,
            pool_size: DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(30),
            default_ttl: Some(DEFAULT_TTL),
            lock: LockConfig::default(),
            atomicity: Atomicity::LockToken,
        }
    }
}

impl RedisConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_atomicity(mut self, atomicity: Atomicity) -> Self {
        self.atomicity = atomicity;
        self
    }

    /// Connection URL built from `host`, `password` and `db`.
    ///
    /// The password is inserted as given and must already be URL-safe.
    pub fn url(&self) -> String {
        if self.host.starts_with("redis://") || self.host.starts_with("rediss://") {
            return self.host.clone();
        }
        match &self.password {
            Some(password) => format!("redis://:{}@{}/{}", password, self.host, self.db),
            None => format!("redis://{}/{}", self.host, self.db),
        }
    }
}

/// Lock tokens kept in Redis.
#[derive(Clone)]
struct PoolLockStore {
    pool: Pool,
}

impl LockStore for PoolLockStore {
    async fn try_acquire(&self, token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let reply: Option<redis::Value> = redis::cmd("SET")
            .arg(token)
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(expiry::as_millis_ceil(lease))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, token: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = redis::cmd("DEL").arg(token).query_async(&mut conn).await?;
        Ok(())
    }
}

/// Key reads and writes a conditional write makes under its lock token.
trait KeyStore: Send + Sync {
    fn current(&self, key: &str, fetch_value: bool) -> impl Future<Output = Result<Current>> + Send;

    fn write(
        &self,
        key: &str,
        bytes: &[u8],
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl KeyStore for Pool {
    async fn current(&self, key: &str, fetch_value: bool) -> Result<Current> {
        let mut conn = self.get().await?;
        read_current(&mut conn, key, fetch_value).await
    }

    async fn write(&self, key: &str, bytes: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.get().await?;
        let _: () = set_command(key, bytes, ttl).query_async(&mut conn).await?;
        Ok(())
    }
}

/// Check the precondition of `mutation` and write, holding `key`'s token.
async fn apply_locked<S, K>(
    lock: &DistributedLock<S>,
    store: &K,
    key: &str,
    mutation: &Mutation<'_>,
    ttl: Option<Duration>,
) -> Result<()>
where
    S: LockStore,
    K: KeyStore,
{
    lock.run(key, move || async move {
        let current = store.current(key, mutation.reads_value()).await?;
        let bytes = mutation.apply(current)?;
        store.write(key, &bytes, ttl).await
    })
    .await
}

/// Redis backend with connection pooling and lock-guarded conditional writes.
///
/// `get`, `set`, `delete`, `keys`, `flush` and `get_multi` map to direct
/// commands. `add`, `replace` and `set_fields` check the current state
/// and write inside a per-key critical section (see [`Atomicity`]); plain
/// `set` and `delete` do not take part in it.
///
/// # Example
///
/// ```no_run
/// # use cache_bridge::backend::{CacheBackend, RedisBackend, RedisConfig};
/// # use cache_bridge::{Expiry, Result};
/// # async fn example() -> Result<()> {
/// let config = RedisConfig::default().with_host("localhost:6379");
///
/// let backend = RedisBackend::new(config)?;
/// backend.add("job:42", "queued", Expiry::Default).await?;
/// let state: String = backend.get("job:42").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    default_ttl: Option<Duration>,
    atomicity: Atomicity,
    lock: DistributedLock<PoolLockStore>,
}

impl RedisBackend {
    /// Create new Redis backend from configuration.
    ///
    /// Connections are opened lazily on first use.
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub fn new(config: RedisConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(Error::ConfigError(
                "Redis pool size must be at least 1".to_string(),
            ));
        }

        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.wait_timeout);
        pool_config.timeouts.create = Some(config.connection_timeout);
        pool_config.timeouts.recycle = Some(config.connection_timeout);

        let mut redis_config = Config::from_url(config.url());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Redis backend initialized with host: {} (db: {}, pool size: {}, atomicity: {:?})",
            config.host.rsplit('@').next().unwrap_or_default(),
            config.db,
            config.pool_size,
            config.atomicity
        );

        Ok(RedisBackend {
            lock: DistributedLock::new(PoolLockStore { pool: pool.clone() }, config.lock),
            pool,
            default_ttl: config.default_ttl,
            atomicity: config.atomicity,
        })
    }

    /// Create from host address directly.
    ///
    /// Pool size is determined by:
    /// 1. `REDIS_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub fn from_host(host: impl Into<String>) -> Result<Self> {
        let pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        Self::new(
            RedisConfig::default()
                .with_host(host)
                .with_pool_size(pool_size),
        )
    }

    /// Run `critical` while holding the lock token for `key`.
    ///
    /// This is the critical section `add`, `replace` and `set_fields` use
    /// under [`Atomicity::LockToken`]; it serializes only against other
    /// holders of the same token.
    ///
    /// # Errors
    /// - `Error::LockContention`: token stayed held for every attempt
    /// - `Error::BackendError`: Redis unavailable while acquiring
    /// - whatever `critical` returns
    pub async fn with_lock<F, Fut, T>(&self, key: &str, critical: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.lock.run(key, critical).await
    }

    async fn conn(&self) -> Result<Connection> {
        Ok(self.pool.get().await?)
    }

    async fn mutate(&self, key: &str, mutation: Mutation<'_>, expiry: Expiry) -> Result<()> {
        let ttl = expiry.resolve(self.default_ttl);
        let result = match self.atomicity {
            Atomicity::LockToken => self.mutate_locked(key, &mutation, ttl).await,
            Atomicity::Optimistic => self.mutate_watched(key, &mutation, ttl).await,
        };

        match &result {
            Ok(()) => debug!("✓ Redis {} {} (TTL: {:?})", mutation.name(), key, ttl),
            Err(e) => debug!("Redis {} {} -> {}", mutation.name(), key, e),
        }
        result
    }

    async fn mutate_locked(
        &self,
        key: &str,
        mutation: &Mutation<'_>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        apply_locked(&self.lock, &self.pool, key, mutation, ttl).await
    }

    async fn mutate_watched(
        &self,
        key: &str,
        mutation: &Mutation<'_>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let config = self.lock.config();
        let attempts = config.attempts();

        for attempt in 1..=attempts {
            let mut conn = self.conn().await?;
            match watched_attempt(&mut conn, key, mutation, ttl).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    // The connection returns to the pool and must not stay watched.
                    let unwatched: redis::RedisResult<()> =
                        redis::cmd("UNWATCH").query_async(&mut conn).await;
                    if let Err(u) = unwatched {
                        warn!("⚠ Redis UNWATCH after failed {} {}: {}", mutation.name(), key, u);
                    }
                    return Err(e);
                }
            }
            drop(conn);

            if attempt < attempts {
                let delay = config.delay_after(attempt);
                debug!(
                    "Redis {} {} aborted by concurrent write (attempt {}/{}), retrying in {:?}",
                    mutation.name(),
                    key,
                    attempt,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            "⚠ Redis {} {} kept conflicting after {} attempt(s)",
            mutation.name(),
            key,
            attempts
        );
        Err(Error::LockContention {
            key: key.to_string(),
            attempts,
        })
    }
}

/// One WATCH, check, MULTI/EXEC round on `conn`.
///
/// `Ok(false)` when a concurrent write to `key` aborted the transaction.
/// On `Err` the key may still be watched.
async fn watched_attempt(
    conn: &mut Connection,
    key: &str,
    mutation: &Mutation<'_>,
    ttl: Option<Duration>,
) -> Result<bool> {
    let _: () = redis::cmd("WATCH").arg(key).query_async(&mut *conn).await?;
    let current = read_current(&mut *conn, key, mutation.reads_value()).await?;
    let bytes = mutation.apply(current)?;

    let mut pipe = redis::pipe();
    pipe.atomic().add_command(set_command(key, &bytes, ttl)).ignore();
    // EXEC replies nil when the watched key changed underneath us.
    let committed: Option<()> = pipe.query_async(&mut *conn).await?;
    Ok(committed.is_some())
}

/// What a conditional write needs to know about the key beforehand.
#[derive(Debug, PartialEq)]
enum Current {
    Missing,
    Exists,
    Stored(Vec<u8>),
}

/// A conditional write, decided against [`Current`].
#[derive(Debug)]
enum Mutation<'a> {
    Add(Vec<u8>),
    Replace(Vec<u8>),
    Merge(&'a Map<String, Value>),
}

impl Mutation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Mutation::Add(_) => "ADD",
            Mutation::Replace(_) => "REPLACE",
            Mutation::Merge(_) => "SET_FIELDS",
        }
    }

    fn reads_value(&self) -> bool {
        matches!(self, Mutation::Merge(_))
    }

    /// Bytes to store, or the reason not to store anything.
    fn apply(&self, current: Current) -> Result<Vec<u8>> {
        match (self, current) {
            (Mutation::Add(bytes), Current::Missing) => Ok(bytes.clone()),
            (Mutation::Add(_), _) => Err(Error::NotStored),
            (Mutation::Replace(_), Current::Missing) => Err(Error::NotStored),
            (Mutation::Replace(bytes), _) => Ok(bytes.clone()),
            (Mutation::Merge(fields), Current::Stored(raw)) => {
                let existing: Value = serialization::decode(&raw)?;
                serialization::encode(&serialization::merge_fields(existing, fields)?)
            }
            (Mutation::Merge(_), _) => Err(Error::NotStored),
        }
    }
}

async fn read_current(conn: &mut Connection, key: &str, fetch_value: bool) -> Result<Current> {
    if fetch_value {
        let raw: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(conn).await?;
        Ok(raw.map_or(Current::Missing, Current::Stored))
    } else {
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(conn).await?;
        Ok(if exists {
            Current::Exists
        } else {
            Current::Missing
        })
    }
}

fn set_command(key: &str, bytes: &[u8], ttl: Option<Duration>) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(bytes);
    if let Some(ttl) = ttl {
        cmd.arg("PX").arg(expiry::as_millis_ceil(ttl));
    }
    cmd
}

impl CacheBackend for RedisBackend {
    async fn get<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let mut conn = self.conn().await?;
        let raw: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;

        match raw {
            Some(bytes) => {
                debug!("✓ Redis GET {} -> HIT", key);
                serialization::decode(&bytes)
            }
            None => {
                debug!("✓ Redis GET {} -> MISS", key);
                Err(Error::CacheMiss)
            }
        }
    }

    async fn set<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let bytes = serialization::encode(value)?;
        let ttl = expiry.resolve(self.default_ttl);

        let mut conn = self.conn().await?;
        let _: () = set_command(key, &bytes, ttl).query_async(&mut conn).await?;

        debug!("✓ Redis SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn add<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let bytes = serialization::encode(value)?;
        self.mutate(key, Mutation::Add(bytes), expiry).await
    }

    async fn replace<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let bytes = serialization::encode(value)?;
        self.mutate(key, Mutation::Replace(bytes), expiry).await
    }

    async fn set_fields<T>(&self, key: &str, partial: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let fields = serialization::to_fields(partial)?;
        self.mutate(key, Mutation::Merge(&fields), expiry).await
    }

    async fn get_multi(&self, keys: &[&str]) -> Result<Getter> {
        if keys.is_empty() {
            return Ok(Getter::default());
        }

        let mut conn = self.conn().await?;
        // Single round trip; replies come back in request order.
        let values: Vec<Option<Vec<u8>>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;

        let mut items = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            if let Some(bytes) = value {
                items.insert(key.to_string(), Payload::Encoded(bytes));
            }
        }

        debug!(
            "✓ Redis MGET {} keys ({} hits)",
            keys.len(),
            items.len()
        );
        Ok(Getter::new(items))
    }

    /// Every key in the database, lock tokens (`<key>-op`) of in-flight
    /// conditional writes included.
    async fn keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut keys = HashSet::new();
        let mut cursor: u64 = 0;

        // SCAN may repeat keys across batches.
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("✓ Redis SCAN -> {} keys", keys.len());
        Ok(keys.into_iter().collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;

        if removed > 0 {
            debug!("✓ Redis DELETE {}", key);
        } else {
            debug!("✓ Redis DELETE {} (absent)", key);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;

        warn!("⚠ Redis FLUSHDB executed - all cache cleared!");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.pool.get().await {
            Ok(mut conn) => {
                let pong: redis::RedisResult<String> =
                    redis::cmd("PING").query_async(&mut conn).await;
                Ok(pong.is_ok())
            }
            Err(_) => Ok(false),
        }
    }
}
