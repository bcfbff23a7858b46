//! Coalesced TTL expiration for a single table.
//!
//! Every write to a TTL table enqueues a [`Lifetime`] record. One background
//! thread per table sleeps until the oldest record is due, removes the entry
//! it names if that entry has not been rewritten since, and goes back to
//! sleep until the next deadline. When the queue drains the thread parks on a
//! condition variable until the next write arms it again, so an idle table
//! costs nothing.
//!
//! Because the TTL is uniform per table, queue order equals deadline order and
//! the sweep can stop at the first record that is not yet due.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::cache_entry::{CacheEntry, Lifetime};
#[cfg(feature = "stats")]
use crate::CacheStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweeper {
    NotStarted,
    Running,
    Unavailable,
}

struct TrackerState<K> {
    queue: VecDeque<Lifetime<K>>,
    armed: bool,
    sweeper: Sweeper,
    shutdown: bool,
}

struct TrackerInner<K, V> {
    ttl: Duration,
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    state: Mutex<TrackerState<K>>,
    wakeup: Condvar,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

/// Ordered queue of lifetime records plus the background sweeper that drains it.
///
/// The tracker owns a handle to its table's entry map and only ever removes
/// entries whose version still matches the record being swept. Dropping the
/// tracker stops the sweeper thread.
pub struct ExpirationTracker<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    inner: Arc<TrackerInner<K, V>>,
}

impl<K, V> ExpirationTracker<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an idle tracker. No thread is started until the first record
    /// is enqueued.
    pub fn new(
        ttl: Duration,
        entries: Arc<DashMap<K, CacheEntry<V>>>,
        #[cfg(feature = "stats")] stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                ttl,
                entries,
                state: Mutex::new(TrackerState {
                    queue: VecDeque::new(),
                    armed: false,
                    sweeper: Sweeper::NotStarted,
                    shutdown: false,
                }),
                wakeup: Condvar::new(),
                #[cfg(feature = "stats")]
                stats,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Enqueues a record and arms the sweeper if it is idle.
    ///
    /// Records whose deadline lies beyond what `Instant` can represent are
    /// never due and are not queued.
    pub fn track(&self, record: Lifetime<K>) {
        if record.deadline(self.inner.ttl).is_none() {
            return;
        }

        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }
        if state.sweeper == Sweeper::NotStarted {
            state.sweeper = spawn_sweeper(&self.inner);
        }
        // Without a sweeper, expiry only happens at read time.
        if state.sweeper == Sweeper::Unavailable {
            return;
        }

        state.queue.push_back(record);
        if !state.armed {
            state.armed = true;
            self.inner.wakeup.notify_one();
        }
    }

    /// Drops every pending record. Deadlines already being waited on turn
    /// into no-ops.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.queue.clear();
        self.inner.wakeup.notify_one();
    }

    /// Number of records waiting to be swept.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether the sweeper currently has a deadline to wait for.
    pub fn is_armed(&self) -> bool {
        self.inner.state.lock().armed
    }
}

impl<K, V> Drop for ExpirationTracker<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        state.queue.clear();
        self.inner.wakeup.notify_all();
    }
}

fn spawn_sweeper<K, V>(inner: &Arc<TrackerInner<K, V>>) -> Sweeper
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let inner = Arc::clone(inner);
    let spawned = thread::Builder::new()
        .name("lazytable-sweeper".to_string())
        .spawn(move || inner.run());

    match spawned {
        Ok(_) => Sweeper::Running,
        Err(err) => {
            warn!(error = %err, "failed to spawn expiration sweeper, expiry falls back to read time");
            Sweeper::Unavailable
        }
    }
}

impl<K, V> TrackerInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn run(&self) {
        debug!(ttl_ms = self.ttl.as_millis() as u64, "expiration sweeper started");
        let mut state = self.state.lock();

        loop {
            if state.shutdown {
                break;
            }

            let deadline = match state.queue.front().map(|oldest| oldest.deadline(self.ttl)) {
                Some(Some(deadline)) => deadline,
                Some(None) => {
                    state.queue.pop_front();
                    continue;
                }
                None => {
                    state.armed = false;
                    self.wakeup.wait(&mut state);
                    continue;
                }
            };

            if Instant::now() < deadline {
                self.wakeup.wait_until(&mut state, deadline);
                continue;
            }

            if let Some(record) = state.queue.pop_front() {
                self.expire(&record);
            }
        }

        debug!("expiration sweeper stopped");
    }

    fn expire(&self, record: &Lifetime<K>) {
        let removed = self
            .entries
            .remove_if(&record.key, |_, entry| record.matches(entry))
            .is_some();

        if removed {
            trace!(version = record.version, "expired cache entry");
            #[cfg(feature = "stats")]
            self.stats.record_expiration();
        }
    }
}
