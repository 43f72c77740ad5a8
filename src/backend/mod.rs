//! Cache backends and the contract they share.
//!
//! Call sites are written against [`CacheBackend`] and work unchanged
//! with either the in-process store or Redis.

#[cfg(feature = "inmemory")]
mod inmemory;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::{InMemoryBackend, InMemoryConfig};
#[cfg(feature = "redis")]
pub use redis::{Atomicity, RedisBackend, RedisConfig};

use crate::error::Result;
use crate::expiry::Expiry;
use crate::getter::Getter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

/// Operations every cache backend provides.
///
/// Values are serialized on the way in and decoded into the caller's
/// chosen type on the way out. `add`, `replace` and `set_fields` are
/// atomic with respect to each other on the same key.
///
/// Deleting an absent key succeeds on every backend.
pub trait CacheBackend: Send + Sync {
    /// Fetch and decode the value stored under `key`.
    ///
    /// # Errors
    /// - `Error::CacheMiss`: key is absent or expired
    /// - `Error::DeserializationError`: stored value does not fit `T`
    /// - `Error::BackendError`: store unavailable
    fn get<T>(&self, key: &str) -> impl Future<Output = Result<T>> + Send
    where
        T: DeserializeOwned + Send;

    /// Store `value` under `key` unconditionally.
    fn set<T>(&self, key: &str, value: &T, expiry: Expiry) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + ?Sized + Sync;

    /// Store only if no live entry exists; otherwise `Error::NotStored`.
    fn add<T>(&self, key: &str, value: &T, expiry: Expiry) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + ?Sized + Sync;

    /// Store only if a live entry exists; otherwise `Error::NotStored`.
    fn replace<T>(
        &self,
        key: &str,
        value: &T,
        expiry: Expiry,
    ) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + ?Sized + Sync;

    /// Merge the fields of `partial` into the mapping stored under `key`.
    ///
    /// New fields are inserted, existing ones overwritten, the rest left
    /// alone, and the result is stored with `expiry`.
    ///
    /// # Errors
    /// - `Error::NotStored`: no live entry for `key`
    /// - `Error::TypeMismatch`: stored value or `partial` is not a field
    ///   mapping; the stored value is left unchanged
    fn set_fields<T>(
        &self,
        key: &str,
        partial: &T,
        expiry: Expiry,
    ) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + ?Sized + Sync;

    /// Fetch several keys at once; decoding happens per key on the result.
    fn get_multi(&self, keys: &[&str]) -> impl Future<Output = Result<Getter>> + Send;

    /// All live keys, in no particular order.
    ///
    /// On a shared store this is every key the store holds. For Redis that
    /// includes the `<key>-op` lock tokens of conditional writes running at
    /// that moment; the in-process store never lists them.
    fn keys(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Remove `key`. Absent keys are not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every entry.
    fn flush(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the backend is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;
}
