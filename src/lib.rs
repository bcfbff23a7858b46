//! # Lazytable
//!
//! A thread-safe, lazy-loading key-value cache. Each value type gets its own
//! table with its own loader and optional TTL; a [`Registry`] routes calls to
//! the right table so callers never have to keep table handles around.
//!
//! ## Quick Start
//!
//! ```rust
//! use lazytable::Table;
//! use std::time::Duration;
//!
//! let prices = Table::from_fn_with_ttl(|sku: &u32| sku * 100, Duration::from_secs(60)).unwrap();
//!
//! assert_eq!(prices.get(&3), Ok(300)); // loaded
//! assert_eq!(prices.get(&3), Ok(300)); // cached
//! ```
//!
//! ## Process-wide Registry
//!
//! The free functions in this crate operate on a lazily created global
//! [`Registry`] without a default TTL.
//!
//! ```rust
//! use std::convert::Infallible;
//!
//! let name = lazytable::get(&1u64, |id: &u64| Ok::<_, Infallible>(format!("user-{id}"))).unwrap();
//! assert_eq!(name, "user-1");
//! assert_eq!(lazytable::try_get::<u64, String>(&1), Some("user-1".to_string()));
//! ```
//!
//! ## Loader Errors
//!
//! Loaders return `Result<V, E>` with any error type. A failing loader's
//! error reaches the caller unchanged and nothing is cached.
//!
//! ## Expiration
//!
//! Tables with a TTL start one background thread on their first write. The
//! thread sleeps until the oldest write is due, removes the entry if it was
//! not rewritten since, and parks when nothing is pending. It exits when the
//! table is dropped.

use once_cell::sync::Lazy;
use std::hash::Hash;

pub use lazytable_core::*;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// The process-wide registry behind this crate's free functions.
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// Registers a table for `V` in the global registry.
///
/// See [`Registry::try_add_table`].
pub fn try_add_table<K, V, E, F>(
    loader: F,
    ttl: Option<std::time::Duration>,
) -> Result<bool, CacheError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: 'static,
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
{
    global().try_add_table(loader, ttl)
}

/// Gets `key` from the global table for `V`, loading it on a miss.
///
/// See [`Registry::get`].
pub fn get<K, V, E, F>(key: &K, loader: F) -> Result<V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: 'static,
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
{
    global().get(key, loader)
}

/// Read-only lookup in the global registry.
pub fn try_get<K, V>(key: &K) -> Option<V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    global().try_get(key)
}

/// Upserts into the global table for `V` if it exists.
pub fn try_add_or_update<K, V>(key: K, value: V) -> bool
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    global().try_add_or_update(key, value)
}

/// Upserts into the global table for `V`, creating it with `loader` if needed.
pub fn add_or_update<K, V, E, F>(key: K, value: V, loader: F) -> Result<(), CacheError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: 'static,
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
{
    global().add_or_update(key, value, loader)
}

/// Removes `key` from the global table for `V`.
pub fn try_remove<K: 'static, V: 'static>(key: &K) -> bool {
    global().try_remove::<K, V>(key)
}

/// Drops the global table for `V`.
pub fn try_remove_table<V: 'static>() -> bool {
    global().try_remove_table::<V>()
}

/// Number of entries in the global table for `V`.
pub fn table_items_cached_count<V: 'static>() -> usize {
    global().table_items_cached_count::<V>()
}

/// Drops every table in the global registry.
pub fn clear() {
    global().clear()
}
