//! # Lazytable Core
//!
//! Building blocks for the lazytable caching library: loader-backed tables
//! with optional TTL expiration, and a registry that partitions tables by
//! value type.
//!
//! ## Features
//!
//! - **Lazy loading**: a miss calls the table's loader and caches the result
//! - **TTL expiration**: one background sweeper per table, parked while idle
//! - **Stale-refresh immunity**: a rewritten entry is never removed by an
//!   expiration scheduled for its previous write
//! - **Type-partitioned registry**: one table per value type behind one object
//! - **Single-flight loading**: optional per-table coalescing of concurrent misses
//! - **Statistics**: hit/miss/load/expiration counters (`stats` feature)
//!
//! ## Module Organization
//!
//! - [`cache_entry`] - Immutable entry snapshot and lifetime records
//! - [`config`] - Table configuration and builder
//! - [`error`] - Configuration errors
//! - [`expiration`] - Queue and background sweeper driving TTL removal
//! - [`table`] - The single-type cache
//! - [`registry`] - Value-type routed collection of tables
//!
pub mod cache_entry;
pub mod config;
pub mod error;
pub mod expiration;
pub mod registry;
pub mod table;

#[cfg(feature = "stats")]
mod stats;

pub use cache_entry::{CacheEntry, Lifetime};
pub use config::{TableConfig, TableConfigBuilder};
pub use error::CacheError;
pub use expiration::ExpirationTracker;
pub use registry::{ErasedTable, Registry};
pub use table::{Loader, Table};

#[cfg(feature = "stats")]
pub use stats::CacheStats;
