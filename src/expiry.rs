//! Expiry sentinels and their resolution against a backend default.

use std::time::Duration;

/// Longest time-to-live a backend is asked to honour, about 136 years.
/// Anything longer resolves to no expiry on every backend.
pub const MAX_TTL: Duration = Duration::from_secs(u32::MAX as u64);

/// How long a written entry lives.
///
/// # Example
///
/// ```
/// use cache_bridge::Expiry;
/// use std::time::Duration;
///
/// let default_ttl = Some(Duration::from_secs(60));
///
/// assert_eq!(Expiry::Default.resolve(default_ttl), default_ttl);
/// assert_eq!(Expiry::Never.resolve(default_ttl), None);
/// assert_eq!(
///     Expiry::from(Duration::from_secs(5)).resolve(default_ttl),
///     Some(Duration::from_secs(5))
/// );
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Expiry {
    /// Use the backend's configured default, resolved at write time.
    #[default]
    Default,
    /// The entry is never evicted by time.
    Never,
    /// The entry expires this long after the write.
    After(Duration),
}

impl Expiry {
    /// Resolve to a concrete time-to-live, `None` meaning no expiry.
    ///
    /// `default` is the backend's configured TTL (itself `None` when the
    /// backend keeps entries forever). A zero `After` duration is treated
    /// as `Default`, and anything past [`MAX_TTL`] as `Never`.
    pub fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        let ttl = match self {
            Expiry::Default => default,
            Expiry::Never => None,
            Expiry::After(d) if d.is_zero() => default,
            Expiry::After(d) => Some(d),
        };
        ttl.filter(|d| *d <= MAX_TTL)
    }
}

impl From<Duration> for Expiry {
    fn from(d: Duration) -> Self {
        Expiry::After(d)
    }
}

/// Milliseconds for a store that only speaks whole milliseconds.
/// Anything shorter than 1 ms still expires, after 1 ms; anything past
/// [`MAX_TTL`] is capped to it.
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
pub(crate) fn as_millis_ceil(d: Duration) -> u64 {
    let d = d.min(MAX_TTL);
    let ms = d.as_millis() as u64;
    if Duration::from_millis(ms) < d {
        ms.saturating_add(1)
    } else {
        ms.max(1)
    }
}
