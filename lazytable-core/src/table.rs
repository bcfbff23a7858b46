use std::convert::Infallible;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::cache_entry::CacheEntry;
use crate::config::TableConfig;
use crate::error::Result;
use crate::expiration::ExpirationTracker;
#[cfg(feature = "stats")]
use crate::CacheStats;

/// Caller-supplied function that fetches the value for a key on a miss.
pub type Loader<K, V, E> = Arc<dyn Fn(&K) -> std::result::Result<V, E> + Send + Sync>;

/// A thread-safe, lazily populated cache for a single value type.
///
/// Values are produced by the table's loader the first time a key is read
/// and served from memory afterwards. When a TTL is configured every write is
/// handed to an [`ExpirationTracker`], whose background sweeper removes
/// entries once they are `ttl` old unless they were rewritten in between.
///
/// # Type Parameters
///
/// * `K` - Key type
/// * `V` - Value type, cloned out of the table on every read
/// * `E` - Error type returned by the loader (defaults to `Infallible`)
///
/// # Concurrency
///
/// Entries live in a `DashMap`, so every store is atomic per key and the last
/// writer wins. Concurrent misses for the same key may each call the loader
/// unless the table was built with `single_flight` enabled, in which case
/// they share the result of one in-flight call.
///
/// The loader runs on the calling thread without any table lock held; a slow
/// loader blocks only its caller.
///
/// # Examples
///
/// ```
/// use lazytable_core::Table;
/// use std::time::Duration;
///
/// let table = Table::from_fn_with_ttl(|id: &u32| id * 2, Duration::from_secs(60)).unwrap();
///
/// assert_eq!(table.get(&5), Ok(10));
/// assert_eq!(table.len(), 1);
/// assert!(table.has_ttl());
/// ```
pub struct Table<K, V, E = Infallible>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: 'static,
{
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    loader: Loader<K, V, E>,
    ttl: Option<Duration>,
    tracker: Option<ExpirationTracker<K, V>>,
    in_flight: Option<DashMap<K, Arc<OnceCell<V>>>>,
    version: AtomicU64,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

impl<K, V, E> Table<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: 'static,
{
    /// Creates a table whose entries never expire on their own.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn(&K) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        Self::from_loader(Arc::new(loader), TableConfig::default())
    }

    /// Creates a table whose entries are swept `ttl` after they are written.
    ///
    /// Fails with [`CacheError::InvalidTtl`](crate::CacheError::InvalidTtl)
    /// if `ttl` is zero.
    pub fn with_ttl<F>(loader: F, ttl: Duration) -> Result<Self>
    where
        F: Fn(&K) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        Self::with_config(loader, TableConfig::ttl(ttl))
    }

    /// Creates a table from a full [`TableConfig`].
    pub fn with_config<F>(loader: F, config: TableConfig) -> Result<Self>
    where
        F: Fn(&K) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self::from_loader(Arc::new(loader), config))
    }

    /// Builds a table around an already shared loader. `config` must have
    /// been validated.
    pub(crate) fn from_loader(loader: Loader<K, V, E>, config: TableConfig) -> Self {
        let entries = Arc::new(DashMap::new());
        #[cfg(feature = "stats")]
        let stats = Arc::new(CacheStats::new());

        let tracker = config.ttl.map(|ttl| {
            ExpirationTracker::new(
                ttl,
                Arc::clone(&entries),
                #[cfg(feature = "stats")]
                Arc::clone(&stats),
            )
        });

        Self {
            entries,
            loader,
            ttl: config.ttl,
            tracker,
            in_flight: config.single_flight.then(DashMap::new),
            version: AtomicU64::new(0),
            #[cfg(feature = "stats")]
            stats,
        }
    }

    /// Returns the cached value for `key`, calling the loader on a miss.
    ///
    /// An entry older than the TTL counts as a miss even if the sweeper has
    /// not removed it yet. A loader error is returned unchanged and leaves
    /// the table untouched.
    pub fn get(&self, key: &K) -> std::result::Result<V, E> {
        if let Some(value) = self.fresh(key) {
            #[cfg(feature = "stats")]
            self.stats.record_hit();
            return Ok(value);
        }

        #[cfg(feature = "stats")]
        self.stats.record_miss();

        match &self.in_flight {
            Some(in_flight) => self.load_single_flight(in_flight, key),
            None => self.load(key),
        }
    }

    /// Returns the cached value for `key` without ever calling the loader.
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.fresh(key)
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn add_or_update(&self, key: K, value: V) {
        self.store(key, value);
    }

    /// Removes the entry for `key`. Returns whether there was one.
    pub fn try_remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry and forgets all pending expirations.
    pub fn clear(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.reset();
        }
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a fresh entry exists for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(self.ttl))
            .unwrap_or(false)
    }

    pub fn has_ttl(&self) -> bool {
        self.ttl.is_some()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Whether concurrent misses for one key share a loader call.
    pub fn is_single_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Snapshot of this table's counters.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> CacheStats {
        (*self.stats).clone()
    }

    /// Number of lifetime records waiting for the sweeper.
    pub fn pending_expirations(&self) -> usize {
        self.tracker.as_ref().map_or(0, ExpirationTracker::pending)
    }

    fn fresh(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(self.ttl) {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    fn load(&self, key: &K) -> std::result::Result<V, E> {
        debug!(table = std::any::type_name::<V>(), "cache miss, invoking loader");
        match (self.loader)(key) {
            Ok(value) => {
                #[cfg(feature = "stats")]
                self.stats.record_load();
                self.store(key.clone(), value.clone());
                Ok(value)
            }
            Err(err) => {
                #[cfg(feature = "stats")]
                self.stats.record_load_failure();
                Err(err)
            }
        }
    }

    fn load_single_flight(
        &self,
        in_flight: &DashMap<K, Arc<OnceCell<V>>>,
        key: &K,
    ) -> std::result::Result<V, E> {
        let cell = Arc::clone(
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        // Whoever initializes the cell re-checks the map first, so a caller
        // arriving just after a completed load does not load again.
        let result = cell
            .get_or_try_init(|| match self.fresh(key) {
                Some(value) => Ok(value),
                None => self.load(key),
            })
            .cloned();

        in_flight.remove_if(key, |_, current| Arc::ptr_eq(current, &cell));
        result
    }

    fn store(&self, key: K, value: V) {
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = CacheEntry::new(value, version);

        match &self.tracker {
            Some(tracker) => {
                let record = entry.lifetime(key.clone());
                self.entries.insert(key, entry);
                tracker.track(record);
            }
            None => {
                self.entries.insert(key, entry);
            }
        }
    }
}

impl<K, V> Table<K, V, Infallible>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a non-expiring table from a loader that cannot fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use lazytable_core::Table;
    ///
    /// let table = Table::from_fn(|name: &String| name.len());
    /// assert_eq!(table.get(&"four".to_string()), Ok(4));
    /// ```
    pub fn from_fn<F>(loader: F) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        Self::new(move |key: &K| Ok(loader(key)))
    }

    /// Creates a TTL table from a loader that cannot fail.
    pub fn from_fn_with_ttl<F>(loader: F, ttl: Duration) -> Result<Self>
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        Self::with_ttl(move |key: &K| Ok(loader(key)), ttl)
    }
}
