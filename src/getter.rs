//! Read-only view over the result of a batched fetch.

use crate::error::{Error, Result};
use crate::serialization::Payload;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Snapshot returned by [`CacheBackend::get_multi`](crate::CacheBackend::get_multi).
///
/// Holds the raw payloads fetched at call time and decodes each one only
/// when asked for. It owns its data and holds no store connection, so it
/// can be moved freely across tasks.
///
/// # Example
///
/// ```
/// # use cache_bridge::backend::{CacheBackend, InMemoryBackend};
/// # use cache_bridge::{Expiry, Result};
/// # async fn example() -> Result<()> {
/// let cache = InMemoryBackend::new();
/// cache.set("x", &42, Expiry::Default).await?;
///
/// let getter = cache.get_multi(&["x", "y"]).await?;
/// assert_eq!(getter.get::<i32>("x")?, 42);
/// assert!(getter.get::<i32>("y").unwrap_err().is_miss());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Getter {
    items: HashMap<String, Payload>,
}

impl Getter {
    pub(crate) fn new(items: HashMap<String, Payload>) -> Self {
        Getter { items }
    }

    /// Decode the payload for `key`.
    ///
    /// # Errors
    /// - `Error::CacheMiss`: key was not requested or was absent at fetch time
    /// - `Error::DeserializationError`: payload does not fit `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.items.get(key).ok_or(Error::CacheMiss)?.decode()
    }

    /// Whether `key` had a live entry at fetch time.
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Keys that had a live entry at fetch time.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
