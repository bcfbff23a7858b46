//! # Table Registry
//!
//! A [`Registry`] routes every operation to the [`Table`] registered for the
//! operation's *value* type, so one object can hold many independently typed
//! caches. Tables are stored behind the object-safe [`ErasedTable`] trait and
//! recovered as concrete `Table<K, V, E>` at the typed entry points.
//!
//! # Examples
//!
//! ```rust
//! use lazytable_core::Registry;
//! use std::convert::Infallible;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct User {
//!     id: u32,
//! }
//!
//! let registry = Registry::new();
//! let user = registry
//!     .get(&7u32, |id: &u32| Ok::<_, Infallible>(User { id: *id }))
//!     .unwrap();
//!
//! assert_eq!(user, User { id: 7 });
//! assert_eq!(registry.table_items_cached_count::<User>(), 1);
//! ```

use std::any::{type_name, Any, TypeId};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::{validate_ttl, TableConfig};
use crate::error::{CacheError, Result};
use crate::table::{Loader, Table};
#[cfg(feature = "stats")]
use crate::CacheStats;

/// Type-erased view of a table, used where only the value type is known.
pub trait ErasedTable: Send + Sync {
    /// Upcasts to `Any` so the registry can recover the concrete table.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Read-only lookup. Returns `None` if `key` has the wrong type.
    fn try_get_erased(&self, key: &dyn Any) -> Option<Box<dyn Any>>;

    /// Upsert. Returns false if `key` or `value` has the wrong type.
    fn add_or_update_erased(&self, key: Box<dyn Any>, value: Box<dyn Any>) -> bool;

    /// Removal. Returns false if `key` has the wrong type or was absent.
    fn try_remove_erased(&self, key: &dyn Any) -> bool;

    fn clear(&self);

    fn len(&self) -> usize;

    #[cfg(feature = "stats")]
    fn stats(&self) -> CacheStats;
}

impl<K, V, E> ErasedTable for Table<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: 'static,
{
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn try_get_erased(&self, key: &dyn Any) -> Option<Box<dyn Any>> {
        let key = key.downcast_ref::<K>()?;
        self.try_get(key).map(|value| Box::new(value) as Box<dyn Any>)
    }

    fn add_or_update_erased(&self, key: Box<dyn Any>, value: Box<dyn Any>) -> bool {
        match (key.downcast::<K>(), value.downcast::<V>()) {
            (Ok(key), Ok(value)) => {
                self.add_or_update(*key, *value);
                true
            }
            _ => false,
        }
    }

    fn try_remove_erased(&self, key: &dyn Any) -> bool {
        key.downcast_ref::<K>()
            .map(|key| self.try_remove(key))
            .unwrap_or(false)
    }

    fn clear(&self) {
        Table::clear(self);
    }

    fn len(&self) -> usize {
        Table::len(self)
    }

    #[cfg(feature = "stats")]
    fn stats(&self) -> CacheStats {
        Table::stats(self)
    }
}

/// A container of tables, one per value type.
///
/// Tables are created explicitly with [`try_add_table`](Self::try_add_table)
/// or implicitly by the first [`get`](Self::get) or
/// [`add_or_update`](Self::add_or_update) for a value type. Implicit tables
/// use the registry's default TTL.
///
/// # Thread Safety
///
/// The type-to-table map is a `DashMap`. When two callers race to create the
/// table for a value type, the first insert wins. A `get` that finds the slot
/// locked does not wait for it: it looks the table up once more and, if it is
/// still missing, calls its loader directly and returns that value uncached.
///
/// The slot shares a shard lock with other value types, so this fallback can
/// also fire when an unrelated table is being created or removed at the same
/// moment, not only when two callers race for the same type. It only affects
/// the first access to a value type; once the table exists `get` always
/// reaches it.
#[derive(Default)]
pub struct Registry {
    tables: DashMap<TypeId, Arc<dyn ErasedTable>>,
    default_ttl: Option<Duration>,
}

impl Registry {
    /// Creates a registry whose implicit tables never expire entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose implicit tables use `ttl`.
    pub fn with_default_ttl(ttl: Duration) -> Result<Self> {
        validate_ttl(Some(ttl))?;
        Ok(Self {
            tables: DashMap::new(),
            default_ttl: Some(ttl),
        })
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn default_config(&self) -> TableConfig {
        TableConfig {
            ttl: self.default_ttl,
            ..TableConfig::default()
        }
    }

    /// Registers a table for value type `V` if none exists yet.
    ///
    /// `ttl` overrides the registry default; `None` keeps the default.
    /// Returns `Ok(false)` without effect when a table for `V` is already
    /// registered.
    pub fn try_add_table<K, V, E, F>(&self, loader: F, ttl: Option<Duration>) -> Result<bool>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        E: 'static,
        F: Fn(&K) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        let config = TableConfig {
            ttl: ttl.or(self.default_ttl),
            ..TableConfig::default()
        };
        self.try_add_table_with_config(loader, config)
    }

    /// Registers a table for value type `V` with an explicit configuration.
    pub fn try_add_table_with_config<K, V, E, F>(
        &self,
        loader: F,
        config: TableConfig,
    ) -> Result<bool>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        E: 'static,
        F: Fn(&K) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        config.validate()?;
        match self.tables.entry(TypeId::of::<V>()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let table: Table<K, V, E> = Table::from_loader(Arc::new(loader), config);
                slot.insert(Arc::new(table));
                debug!(value_type = type_name::<V>(), ttl = ?config.ttl, "registered table");
                Ok(true)
            }
        }
    }

    /// Returns the value for `key` from the table for `V`, creating the table
    /// with `loader` and the default TTL if there is none.
    ///
    /// If the table cannot be used for this call (its shard is locked and no
    /// table appeared on a second look, or the registered table has different
    /// key/error types) the loader is called directly and its result is not
    /// cached. Loader errors are
    /// returned unchanged.
    pub fn get<K, V, E, F>(&self, key: &K, loader: F) -> std::result::Result<V, E>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        E: 'static,
        F: Fn(&K) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        match self.table::<K, V, E>() {
            Some(Ok(table)) => return table.get(key),
            Some(Err(err)) => {
                warn!(error = %err, "bypassing cache for mismatched table");
                return loader(key);
            }
            None => {}
        }

        let loader: Loader<K, V, E> = Arc::new(loader);
        let created: Arc<Table<K, V, E>> = Arc::new(Table::from_loader(
            Arc::clone(&loader),
            self.default_config(),
        ));

        let winner = match self.tables.try_entry(TypeId::of::<V>()) {
            // The shard is busy, possibly with an unrelated write. A concurrent
            // creator may have finished by now.
            None => self.erased::<V>(),
            Some(Entry::Occupied(slot)) => Some(Arc::clone(slot.get())),
            Some(Entry::Vacant(slot)) => {
                slot.insert(Arc::clone(&created) as Arc<dyn ErasedTable>);
                debug!(value_type = type_name::<V>(), "created table on first access");
                Some(created as Arc<dyn ErasedTable>)
            }
        };

        match winner.map(downcast::<K, V, E>) {
            Some(Ok(table)) => table.get(key),
            Some(Err(err)) => {
                warn!(error = %err, "bypassing cache for mismatched table");
                loader(key)
            }
            None => {
                debug!(
                    value_type = type_name::<V>(),
                    "table shard contended, loading without cache"
                );
                loader(key)
            }
        }
    }

    /// Read-only lookup. `None` if there is no table for `V` or no fresh
    /// entry for `key`.
    pub fn try_get<K, V>(&self, key: &K) -> Option<V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let table = self.erased::<V>()?;
        let value = table.try_get_erased(key)?;
        value.downcast::<V>().ok().map(|value| *value)
    }

    /// Upserts into the table for `V` if one exists. Returns false if no
    /// table is configured for `V`.
    pub fn try_add_or_update<K, V>(&self, key: K, value: V) -> bool
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        match self.erased::<V>() {
            Some(table) => table.add_or_update_erased(Box::new(key), Box::new(value)),
            None => false,
        }
    }

    /// Upserts into the table for `V`, creating it with `loader` first if
    /// needed.
    pub fn add_or_update<K, V, E, F>(&self, key: K, value: V, loader: F) -> Result<()>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        E: 'static,
        F: Fn(&K) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        let erased = Arc::clone(
            self.tables
                .entry(TypeId::of::<V>())
                .or_insert_with(|| {
                    debug!(value_type = type_name::<V>(), "created table on upsert");
                    Arc::new(Table::from_loader(
                        Arc::new(loader) as Loader<K, V, E>,
                        self.default_config(),
                    )) as Arc<dyn ErasedTable>
                })
                .value(),
        );

        if erased.add_or_update_erased(Box::new(key), Box::new(value)) {
            Ok(())
        } else {
            Err(CacheError::mismatch::<Table<K, V, E>>(type_name::<V>()))
        }
    }

    /// Drops the table for `V`. Returns whether one existed.
    pub fn try_remove_table<V: 'static>(&self) -> bool {
        let removed = self.tables.remove(&TypeId::of::<V>()).is_some();
        if removed {
            debug!(value_type = type_name::<V>(), "removed table");
        }
        removed
    }

    /// Removes `key` from the table for `V`.
    pub fn try_remove<K, V>(&self, key: &K) -> bool
    where
        K: 'static,
        V: 'static,
    {
        self.erased::<V>()
            .map(|table| table.try_remove_erased(key))
            .unwrap_or(false)
    }

    /// Drops every table.
    pub fn clear(&self) {
        self.tables.clear();
    }

    /// Number of entries in the table for `V`, 0 if there is none.
    pub fn table_items_cached_count<V: 'static>(&self) -> usize {
        self.erased::<V>().map_or(0, |table| table.len())
    }

    pub fn has_table<V: 'static>(&self) -> bool {
        self.tables.contains_key(&TypeId::of::<V>())
    }

    /// Number of registered tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Snapshot of the counters of the table for `V`.
    #[cfg(feature = "stats")]
    pub fn table_stats<V: 'static>(&self) -> Option<CacheStats> {
        self.erased::<V>().map(|table| table.stats())
    }

    fn erased<V: 'static>(&self) -> Option<Arc<dyn ErasedTable>> {
        self.tables
            .get(&TypeId::of::<V>())
            .map(|table| Arc::clone(table.value()))
    }

    fn table<K, V, E>(&self) -> Option<Result<Arc<Table<K, V, E>>>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        E: 'static,
    {
        self.erased::<V>().map(downcast::<K, V, E>)
    }
}

fn downcast<K, V, E>(table: Arc<dyn ErasedTable>) -> Result<Arc<Table<K, V, E>>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: 'static,
{
    table
        .into_any()
        .downcast::<Table<K, V, E>>()
        .map_err(|_| CacheError::mismatch::<Table<K, V, E>>(type_name::<V>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Clone, Debug, PartialEq)]
    struct Foo(u32);

    fn ok<T>(value: T) -> std::result::Result<T, Infallible> {
        Ok(value)
    }

    #[test]
    fn test_try_add_table_once_per_value_type() {
        let registry = Registry::new();
        assert_eq!(
            registry.try_add_table(|id: &u32| ok(id.to_string()), None),
            Ok(true)
        );
        // Different key type, same value type: still rejected.
        assert_eq!(
            registry.try_add_table(|id: &u64| ok(id.to_string()), None),
            Ok(false)
        );
        assert_eq!(registry.table_count(), 1);
    }

    #[test]
    fn test_try_add_table_rejects_zero_ttl() {
        let registry = Registry::new();
        let result = registry.try_add_table(|id: &u32| ok(*id), Some(Duration::ZERO));
        assert_eq!(result, Err(CacheError::InvalidTtl));
        assert!(!registry.has_table::<u32>());
    }

    #[test]
    fn test_with_default_ttl_rejects_zero() {
        assert!(matches!(
            Registry::with_default_ttl(Duration::ZERO),
            Err(CacheError::InvalidTtl)
        ));
    }

    #[test]
    fn test_get_creates_table_with_default_ttl() {
        let registry = Registry::with_default_ttl(Duration::from_secs(30)).unwrap();
        assert_eq!(registry.get(&1u32, |id: &u32| ok(Foo(*id))), Ok(Foo(1)));
        assert_eq!(registry.table_items_cached_count::<Foo>(), 1);
        let table = registry.table::<u32, Foo, Infallible>().unwrap().unwrap();
        assert_eq!(table.ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_explicit_ttl_overrides_default() {
        let registry = Registry::with_default_ttl(Duration::from_secs(30)).unwrap();
        registry
            .try_add_table(|id: &u32| ok(Foo(*id)), Some(Duration::from_secs(5)))
            .unwrap();
        let table = registry.table::<u32, Foo, Infallible>().unwrap().unwrap();
        assert_eq!(table.ttl(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_get_uses_registered_loader() {
        let registry = Registry::new();
        registry
            .try_add_table(|id: &u32| ok(Foo(id * 100)), None)
            .unwrap();

        // The per-call loader is ignored once a table exists.
        assert_eq!(registry.get(&2u32, |id: &u32| ok(Foo(*id))), Ok(Foo(200)));
    }

    #[test]
    fn test_mismatched_key_type_bypasses_cache() {
        let registry = Registry::new();
        registry.try_add_table(|id: &u32| ok(Foo(*id)), None).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = Arc::clone(&calls);
            let value = registry.get(&9u64, move |id: &u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                ok(Foo(*id as u32))
            });
            assert_eq!(value, Ok(Foo(9)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.table_items_cached_count::<Foo>(), 0);
    }

    #[test]
    fn test_add_or_update_reports_mismatch() {
        let registry = Registry::new();
        registry.try_add_table(|id: &u32| ok(Foo(*id)), None).unwrap();

        let result = registry.add_or_update(1u64, Foo(1), |id: &u64| ok(Foo(*id as u32)));
        assert!(matches!(result, Err(CacheError::TableTypeMismatch { .. })));
    }

    #[test]
    fn test_erased_operations_ignore_wrong_key_type() {
        let registry = Registry::new();
        registry.add_or_update(1u32, Foo(1), |id: &u32| ok(Foo(*id))).unwrap();

        assert_eq!(registry.try_get::<u64, Foo>(&1), None);
        assert!(!registry.try_remove::<u64, Foo>(&1));
        assert!(!registry.try_add_or_update(1u64, Foo(5)));
        assert_eq!(registry.try_get::<u32, Foo>(&1), Some(Foo(1)));
    }

    #[test]
    fn test_locked_shard_loads_without_caching() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        // A shared guard on the slot's shard keeps lookups working but makes
        // `try_entry` fail, as an in-progress write to that shard would.
        let shard = registry.tables.determine_map(&TypeId::of::<Foo>());
        let guard = registry.tables.shards()[shard].read();

        let value = registry.get(&3u32, move |id: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            ok(Foo(id * 2))
        });
        drop(guard);

        assert_eq!(value, Ok(Foo(6)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.has_table::<Foo>());
        assert_eq!(registry.table_items_cached_count::<Foo>(), 0);

        // With the shard free the next access creates and fills the table.
        assert_eq!(registry.get(&3u32, |id: &u32| ok(Foo(id * 2))), Ok(Foo(6)));
        assert_eq!(registry.table_items_cached_count::<Foo>(), 1);
    }

    #[test]
    fn test_concurrent_first_access_yields_one_table() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..2u32)
            .map(|n| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get(&1u32, move |id: &u32| ok(Foo(id + n * 10))))
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();
        for result in &results {
            assert!(*result == Foo(1) || *result == Foo(11));
        }

        assert_eq!(registry.table_count(), 1);
        let cached = registry.try_get::<u32, Foo>(&1);
        assert!(cached == Some(Foo(1)) || cached == Some(Foo(11)));
        // Whoever lost now shares the winner's entry.
        assert_eq!(registry.get(&1u32, |_: &u32| ok(Foo(99))).ok(), cached);
    }
}
