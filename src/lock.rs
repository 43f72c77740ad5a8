//! Cooperative per-key lock over a store with a set-if-absent primitive.
//!
//! The lock is a token key (`<key>-op`) created atomically with a short
//! lease. Whoever creates it owns the critical section until it deletes
//! the token or the lease runs out, so a crashed holder cannot wedge the
//! key for longer than one lease.

use crate::error::{Error, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Suffix appended to a key to form its lock token.
pub const LOCK_SUFFIX: &str = "-op";

/// Lock token key protecting `key`.
pub fn token_key(key: &str) -> String {
    format!("{}{}", key, LOCK_SUFFIX)
}

/// Wait policy between failed acquisition attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Wait `retry_delay` before every retry.
    #[default]
    Fixed,
    /// Double the wait after each failed attempt, capped at `max_delay`.
    Exponential { max_delay: Duration },
}

/// Tuning for lock acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConfig {
    /// Total acquisition attempts before giving up. Zero is treated as one.
    pub max_attempts: u32,
    /// Base wait between attempts.
    pub retry_delay: Duration,
    pub backoff: Backoff,
    /// Lifetime of the token if it is never released.
    pub lease: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            max_attempts: 5,
            retry_delay: Duration::from_millis(100),
            backoff: Backoff::Fixed,
            lease: Duration::from_secs(5),
        }
    }
}

impl LockConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the `failed`-th failed attempt (1-based).
    pub(crate) fn delay_after(&self, failed: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.retry_delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(failed.saturating_sub(1));
                self.retry_delay.saturating_mul(factor).min(max_delay)
            }
        }
    }
}

/// Store primitives the lock protocol needs.
pub trait LockStore: Send + Sync {
    /// Atomically create `token` with the given lease if it does not exist.
    ///
    /// Returns `Ok(false)` when the token is already held. Any `Err` is a
    /// store failure and is not retried.
    fn try_acquire(&self, token: &str, lease: Duration)
        -> impl Future<Output = Result<bool>> + Send;

    /// Delete `token`.
    fn release(&self, token: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Runs critical sections under a per-key lock token.
#[derive(Clone, Debug)]
pub struct DistributedLock<S> {
    store: S,
    config: LockConfig,
}

impl<S: LockStore> DistributedLock<S> {
    pub fn new(store: S, config: LockConfig) -> Self {
        DistributedLock { store, config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the token for `key`, run `critical`, release the token.
    ///
    /// The token is deleted whether `critical` succeeds, fails or panics.
    /// A panic is resumed once the token is gone; otherwise the critical
    /// section's own result is returned.
    ///
    /// # Errors
    /// - `Error::LockContention`: token stayed held for every attempt
    /// - any store error from acquisition, unchanged and without retry
    /// - whatever `critical` returns
    pub async fn run<F, Fut, T>(&self, key: &str, critical: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = token_key(key);
        let attempts = self.config.attempts();
        let mut failed = 0;

        while !self.store.try_acquire(&token, self.config.lease).await? {
            failed += 1;
            if failed >= attempts {
                warn!("⚠ Lock {} still held after {} attempt(s)", token, failed);
                return Err(Error::LockContention {
                    key: key.to_string(),
                    attempts: failed,
                });
            }

            let delay = self.config.delay_after(failed);
            debug!(
                "Lock {} busy (attempt {}/{}), retrying in {:?}",
                token, failed, attempts, delay
            );
            tokio::time::sleep(delay).await;
        }

        debug!("✓ Lock {} acquired", token);
        let outcome = AssertUnwindSafe(async move { critical().await })
            .catch_unwind()
            .await;

        if let Err(e) = self.store.release(&token).await {
            warn!(
                "⚠ Failed to release lock {} (expires in {:?}): {}",
                token, self.config.lease, e
            );
        }

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                warn!("⚠ Critical section under lock {} panicked", token);
                panic::resume_unwind(payload)
            }
        }
    }
}
