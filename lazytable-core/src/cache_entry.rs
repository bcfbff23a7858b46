use std::time::{Duration, Instant};

/// Immutable snapshot of a cached value and the moment it was stored.
///
/// Entries are never mutated in place. A refresh (reload or explicit upsert)
/// replaces the whole entry, which is what lets the expiration sweeper decide
/// whether the entry it is looking at is still the one it was asked to expire.
///
/// # Type Parameters
///
/// * `V` - The type of the cached value
///
/// # Fields
///
/// * `value` - The cached value
/// * `last_updated` - The `Instant` this entry was created or refreshed
/// * `version` - Per-table write counter, unique for every stored entry
///
/// # Examples
///
/// ```
/// use lazytable_core::CacheEntry;
/// use std::time::Duration;
///
/// let entry = CacheEntry::new(42, 1);
/// assert_eq!(entry.value, 42);
///
/// // Not expired with a one minute TTL
/// assert!(!entry.is_expired(Some(Duration::from_secs(60))));
/// ```
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub last_updated: Instant,
    pub version: u64,
}

impl<V> CacheEntry<V> {
    /// Creates a new entry stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to cache
    /// * `version` - The write version assigned by the owning table
    pub fn new(value: V, version: u64) -> Self {
        Self {
            value,
            last_updated: Instant::now(),
            version,
        }
    }

    /// Returns true if the entry is at least `ttl` old.
    ///
    /// # Arguments
    ///
    /// * `ttl` - Optional time-to-live. `None` means the entry never expires.
    ///
    /// # Examples
    ///
    /// ```
    /// use lazytable_core::CacheEntry;
    /// use std::thread;
    /// use std::time::Duration;
    ///
    /// let entry = CacheEntry::new("data", 1);
    /// thread::sleep(Duration::from_millis(20));
    ///
    /// assert!(entry.is_expired(Some(Duration::from_millis(10))));
    /// assert!(!entry.is_expired(None));
    /// ```
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.last_updated.elapsed() >= ttl,
            None => false,
        }
    }

    /// Builds the lifetime record that schedules this entry for expiration.
    pub fn lifetime<K>(&self, key: K) -> Lifetime<K> {
        Lifetime {
            key,
            cached_on: self.last_updated,
            version: self.version,
        }
    }
}

/// A queued expiration record: which key was written, and when.
///
/// Records are enqueued in write order. Since every table has a single TTL,
/// write order is also expiration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lifetime<K> {
    pub key: K,
    pub cached_on: Instant,
    pub version: u64,
}

impl<K> Lifetime<K> {
    /// The instant at which the record becomes due, or `None` if `ttl` is
    /// too large to ever come due.
    pub fn deadline(&self, ttl: Duration) -> Option<Instant> {
        self.cached_on.checked_add(ttl)
    }

    /// Whether `entry` is still the exact write this record was created for.
    pub fn matches<V>(&self, entry: &CacheEntry<V>) -> bool {
        entry.version == self.version && entry.last_updated == self.cached_on
    }
}
