//! Error types shared by every backend.

use thiserror::Error as ThisError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a cache operation can fail with.
///
/// `CacheMiss` and `NotStored` are routine outcomes rather than faults:
/// a miss means the key is absent or expired, and `NotStored` means the
/// precondition of `add`, `replace` or `set_fields` did not hold.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// Key is absent or its entry has expired.
    #[error("cache miss")]
    CacheMiss,

    /// The store-if-absent / store-if-present precondition failed.
    #[error("item not stored")]
    NotStored,

    /// The per-key critical section could not be entered within the
    /// configured number of attempts.
    #[error("could not acquire lock for key {key} after {attempts} attempt(s)")]
    LockContention { key: String, attempts: u32 },

    /// A value that must be a field mapping is something else.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("serialization failed: {0}")]
    SerializationError(String),

    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// Store unreachable, pool exhausted, protocol failure.
    #[error("backend error: {0}")]
    BackendError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// True for [`Error::CacheMiss`].
    pub fn is_miss(&self) -> bool {
        matches!(self, Error::CacheMiss)
    }

    /// True for [`Error::NotStored`].
    pub fn is_not_stored(&self) -> bool {
        matches!(self, Error::NotStored)
    }

    /// True for [`Error::LockContention`]. Callers may retry these at a
    /// higher level; this crate never does.
    pub fn is_contention(&self) -> bool {
        matches!(self, Error::LockContention { .. })
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::redis::RedisError> for Error {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        Error::BackendError(format!("Redis command failed: {}", e))
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for Error {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Error::BackendError(format!("Failed to get Redis connection: {}", e))
    }
}
