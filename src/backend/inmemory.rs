//! In-process cache backend.

use super::CacheBackend;
use crate::error::{Error, Result};
use crate::expiry::Expiry;
use crate::getter::Getter;
use crate::serialization::{self, Payload};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default time-to-live for entries written with [`Expiry::Default`].
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Configuration for the in-memory backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InMemoryConfig {
    /// TTL applied for [`Expiry::Default`]; `None` keeps such entries forever.
    pub default_ttl: Option<Duration>,
    /// Period of the background purge of expired entries, if any.
    /// Expiry is enforced at read time either way; the purge only frees memory.
    pub cleanup_interval: Option<Duration>,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        InMemoryConfig {
            default_ttl: Some(DEFAULT_TTL),
            cleanup_interval: None,
        }
    }
}

struct Item {
    value: Value,
    expires_at: Option<Instant>,
}

impl Item {
    fn new(value: Value, ttl: Option<Duration>, now: Instant) -> Self {
        Item {
            value,
            expires_at: ttl.and_then(|d| now.checked_add(d)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Expiring map with atomic add/replace. Expired items stay in place until
/// overwritten, deleted or purged, but are never visible.
#[derive(Default)]
struct ExpiringMap {
    items: DashMap<String, Item>,
}

impl ExpiringMap {
    fn get(&self, key: &str, now: Instant) -> Option<Value> {
        self.items
            .get(key)
            .filter(|item| item.is_live(now))
            .map(|item| item.value.clone())
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>, now: Instant) {
        self.items.insert(key.to_string(), Item::new(value, ttl, now));
    }

    /// Insert unless a live item exists. Returns whether it was stored.
    fn add(&self, key: &str, value: Value, ttl: Option<Duration>, now: Instant) -> bool {
        match self.items.entry(key.to_string()) {
            MapEntry::Occupied(occupied) if occupied.get().is_live(now) => false,
            MapEntry::Occupied(mut occupied) => {
                occupied.insert(Item::new(value, ttl, now));
                true
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Item::new(value, ttl, now));
                true
            }
        }
    }

    /// Overwrite only a live item. Returns whether it was stored.
    fn replace(&self, key: &str, value: Value, ttl: Option<Duration>, now: Instant) -> bool {
        match self.items.get_mut(key) {
            Some(mut item) if item.is_live(now) => {
                *item = Item::new(value, ttl, now);
                true
            }
            _ => false,
        }
    }

    fn live_keys(&self, now: Instant) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.is_live(now))
            .map(|item| item.key().clone())
            .collect()
    }

    fn delete(&self, key: &str) -> bool {
        self.items.remove(key).is_some()
    }

    fn flush(&self) {
        self.items.clear();
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| item.is_live(now));
        before.saturating_sub(self.items.len())
    }

    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.items.len()
    }
}

struct Inner {
    store: RwLock<ExpiringMap>,
    default_ttl: Option<Duration>,
}

/// In-process cache backed by an expiring map behind one reader-writer lock.
///
/// Reads share the lock; every write takes it exclusively, so `set_fields`
/// is a single critical section without any extra protocol. Cloning is
/// cheap and clones share the same entries.
///
/// # Example
///
/// ```
/// # use cache_bridge::backend::{CacheBackend, InMemoryBackend};
/// # use cache_bridge::{Expiry, Result};
/// # use std::time::Duration;
/// # async fn example() -> Result<()> {
/// let cache = InMemoryBackend::new();
/// cache.set("greeting", "hello", Expiry::After(Duration::from_secs(30))).await?;
///
/// let greeting: String = cache.get("greeting").await?;
/// assert_eq!(greeting, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    /// Create a backend with the default configuration.
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    /// Create a backend whose [`Expiry::Default`] resolves to `default_ttl`.
    pub fn with_default_ttl(default_ttl: Option<Duration>) -> Self {
        Self::with_config(InMemoryConfig {
            default_ttl,
            ..Default::default()
        })
    }

    /// Create a backend from configuration.
    ///
    /// A `cleanup_interval` needs a running tokio runtime; without one the
    /// purge task is not started and expired entries are only dropped when
    /// overwritten or deleted.
    pub fn with_config(config: InMemoryConfig) -> Self {
        let inner = Arc::new(Inner {
            store: RwLock::new(ExpiringMap::default()),
            default_ttl: config.default_ttl,
        });

        if let Some(every) = config.cleanup_interval {
            spawn_cleanup(Arc::downgrade(&inner), every);
        }

        debug!(
            "✓ In-memory backend initialized (default TTL: {:?})",
            config.default_ttl
        );
        InMemoryBackend { inner }
    }

    fn ttl(&self, expiry: Expiry) -> Option<Duration> {
        expiry.resolve(self.inner.default_ttl)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_cleanup(inner: Weak<Inner>, every: Duration) {
    if every.is_zero() {
        warn!("⚠ Ignoring zero cleanup interval for in-memory backend");
        return;
    }
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("⚠ No tokio runtime; in-memory cleanup task not started");
        return;
    };

    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(shared) = inner.upgrade() else {
                break;
            };
            let purged = shared.store.write().await.purge_expired(Instant::now());
            if purged > 0 {
                debug!("✓ In-memory cleanup purged {} expired entries", purged);
            }
        }
    });
}

impl CacheBackend for InMemoryBackend {
    async fn get<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let store = self.inner.store.read().await;
        match store.get(key, Instant::now()) {
            Some(value) => {
                debug!("✓ InMemory GET {} -> HIT", key);
                serialization::from_value(&value)
            }
            None => {
                debug!("✓ InMemory GET {} -> MISS", key);
                Err(Error::CacheMiss)
            }
        }
    }

    async fn set<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let value = serialization::to_value(value)?;
        let ttl = self.ttl(expiry);

        let store = self.inner.store.write().await;
        store.set(key, value, ttl, Instant::now());
        debug!("✓ InMemory SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn add<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let value = serialization::to_value(value)?;
        let ttl = self.ttl(expiry);

        let store = self.inner.store.write().await;
        if store.add(key, value, ttl, Instant::now()) {
            debug!("✓ InMemory ADD {} (TTL: {:?})", key, ttl);
            Ok(())
        } else {
            debug!("InMemory ADD {} -> already present", key);
            Err(Error::NotStored)
        }
    }

    async fn replace<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let value = serialization::to_value(value)?;
        let ttl = self.ttl(expiry);

        let store = self.inner.store.write().await;
        if store.replace(key, value, ttl, Instant::now()) {
            debug!("✓ InMemory REPLACE {} (TTL: {:?})", key, ttl);
            Ok(())
        } else {
            debug!("InMemory REPLACE {} -> not present", key);
            Err(Error::NotStored)
        }
    }

    async fn set_fields<T>(&self, key: &str, partial: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let fields = serialization::to_fields(partial)?;
        let ttl = self.ttl(expiry);

        let store = self.inner.store.write().await;
        let now = Instant::now();
        let existing = store.get(key, now).ok_or(Error::NotStored)?;
        let merged = serialization::merge_fields(existing, &fields)?;
        store.set(key, merged, ttl, now);

        debug!("✓ InMemory SET_FIELDS {} ({} fields)", key, fields.len());
        Ok(())
    }

    async fn get_multi(&self, keys: &[&str]) -> Result<Getter> {
        let store = self.inner.store.read().await;
        let now = Instant::now();

        let mut items = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = store.get(key, now) {
                items.insert(key.to_string(), Payload::Structured(value));
            }
        }

        debug!(
            "✓ InMemory MGET {} keys ({} hits)",
            keys.len(),
            items.len()
        );
        Ok(Getter::new(items))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let store = self.inner.store.read().await;
        Ok(store.live_keys(Instant::now()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let store = self.inner.store.write().await;
        if store.delete(key) {
            debug!("✓ InMemory DELETE {}", key);
        } else {
            debug!("✓ InMemory DELETE {} (absent)", key);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let store = self.inner.store.write().await;
        store.flush();
        warn!("⚠ InMemory FLUSH executed - all cache cleared!");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
