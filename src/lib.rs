//! # cache-bridge
//!
//! One cache contract over interchangeable backends: an in-process
//! expiring map and Redis.
//!
//! ## Features
//!
//! - **Backend Agnostic:** Call sites are generic over [`CacheBackend`]
//! - **Conditional Writes:** `add`, `replace` and `set_fields` are atomic per
//!   key, on Redis through a self-expiring lock token or `WATCH`/`MULTI`
//! - **Typed Reads:** Values decode into whatever serde type the caller asks for
//! - **Explicit Expiry:** [`Expiry::Default`], [`Expiry::Never`] or a duration
//! - **Typed Errors:** misses, failed preconditions and lock contention are
//!   distinct [`Error`] variants
//!
//! ## Quick Start
//!
//! ```
//! use cache_bridge::backend::{CacheBackend, InMemoryBackend};
//! use cache_bridge::{Error, Expiry};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cache_bridge::Result<()> {
//! let cache = InMemoryBackend::new();
//!
//! cache.add("user:1", &json!({"name": "ada"}), Expiry::Default).await?;
//! assert_eq!(
//!     cache.add("user:1", &json!({"name": "bob"}), Expiry::Default).await,
//!     Err(Error::NotStored)
//! );
//!
//! cache.set_fields("user:1", &json!({"admin": true}), Expiry::Never).await?;
//! let user: serde_json::Value = cache.get("user:1").await?;
//! assert_eq!(user, json!({"name": "ada", "admin": true}));
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod error;
pub mod expiry;
pub mod getter;
pub mod lock;
pub mod serialization;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use error::{Error, Result};
pub use expiry::Expiry;
pub use getter::Getter;
pub use lock::{Backoff, DistributedLock, LockConfig, LockStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
