use super::{
    entry::QueryEntry,
    key::QueryKey,
    time::Clock,
};

use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// The invalidation epoch of the store when a fetch began. A fetch only clears
/// invalidations that happened before it began.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FetchEpoch(u64);

/// What happened to an entry when its fetch failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailedFetch {
    /// The entry had data. It was kept and its status set to `Error`.
    Kept,
    /// The entry never had data and was removed.
    Removed,
    /// The entry was removed while the fetch was in flight.
    Missing,
}

/// Holds cached query results keyed by [`QueryKey`][query-key].
///
/// A store performs no I/O. Fetching and mutation are driven by the query
/// clients in [`future`][future-mod] and [`sync`][sync-mod] modules, which own a
/// store and update it as fetches complete. A store can also be used on its own
/// as a plain keyed cache with prefix invalidation:
///
/// ```rust
/// use qcache::{query_key, QueryStore};
///
/// let store = QueryStore::new();
/// store.set_data(query_key!["pets", "list"], vec!["Rex"]);
/// store.set_data(query_key!["pets", "detail", 1], vec!["Rex"]);
/// store.set_data(query_key!["owners"], vec!["Alice"]);
///
/// assert_eq!(store.invalidate(&query_key!["pets"]), 2);
/// assert!(store.get(&query_key!["pets", "list"]).unwrap().is_invalidated());
/// assert!(!store.get(&query_key!["owners"]).unwrap().is_invalidated());
/// ```
///
/// [query-key]: ./struct.QueryKey.html
/// [future-mod]: ./future/index.html
/// [sync-mod]: ./sync/index.html
pub struct QueryStore<V> {
    entries: RwLock<HashMap<QueryKey, QueryEntry<V>>>,
    // Bumped under the write lock of `entries` on every invalidation.
    epoch: AtomicU64,
    clock: Clock,
    stale_time: Option<Duration>,
}

impl<V> Default for QueryStore<V> {
    fn default() -> Self {
        Self::with_clock(Clock::new(), None)
    }
}

impl<V> QueryStore<V> {
    /// Creates an empty store whose entries stay fresh until invalidated.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_clock(clock: Clock, stale_time: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            clock,
            stale_time,
        }
    }

    /// Returns the duration after which successfully fetched data is treated as
    /// stale even without an invalidation. `None` means never.
    pub fn stale_time(&self) -> Option<Duration> {
        self.stale_time
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains_key(&self, key: &QueryKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Returns the keys of all entries, in no particular order.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Marks every existing entry whose key starts with `prefix` as invalidated
    /// and returns the number of matched entries.
    ///
    /// Entries that do not exist yet are not affected; this method never creates
    /// an entry. Invalidating an already invalidated entry leaves it unchanged.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.invalidate_matching(prefix).0
    }

    /// Marks every entry as invalidated and returns the number of entries.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_matching(&QueryKey::new()).0
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of matched entries and the keys of the entries that
    /// were not invalidated before this call.
    pub(crate) fn invalidate_matching(&self, prefix: &QueryKey) -> (usize, Vec<QueryKey>) {
        let mut entries = self.entries.write();
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let mut matched = 0;
        let mut newly_invalidated = Vec::new();

        for (key, entry) in entries.iter_mut().filter(|(k, _)| k.starts_with(prefix)) {
            matched += 1;
            if entry.invalidate(epoch) {
                newly_invalidated.push(key.clone());
            }
        }

        (matched, newly_invalidated)
    }

    /// Removes all entries and returns their keys.
    pub(crate) fn drain(&self) -> Vec<QueryKey> {
        self.entries.write().drain().map(|(k, _)| k).collect()
    }

    /// Creates a pending placeholder for `key` if it does not exist, and flags the
    /// entry as having a fetch in flight.
    pub(crate) fn begin_fetch(&self, key: &QueryKey) -> FetchEpoch {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) => entry.start_fetch(),
            None => {
                entries.insert(key.clone(), QueryEntry::pending(key.clone()));
            }
        }
        FetchEpoch(self.epoch.load(Ordering::Relaxed))
    }

    pub(crate) fn fail_fetch(&self, key: &QueryKey) -> FailedFetch {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.has_data() => {
                entry.fail_fetch(now);
                FailedFetch::Kept
            }
            Some(_) => {
                entries.remove(key);
                FailedFetch::Removed
            }
            None => FailedFetch::Missing,
        }
    }

    /// Releases the in-flight flag of an entry whose fetch will never complete.
    /// Returns `true` if a pending placeholder was removed.
    pub(crate) fn abandon_fetch(&self, key: &QueryKey) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.has_data() => {
                entry.cancel_fetch();
                false
            }
            Some(_) => entries.remove(key).is_some(),
            None => false,
        }
    }
}

impl<V> QueryStore<V>
where
    V: Clone,
{
    /// Returns a snapshot of the entry for `key`. Does not fetch.
    pub fn get(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Returns a clone of the cached data for `key`, stale or not.
    pub fn get_data(&self, key: &QueryKey) -> Option<V> {
        self.entries
            .read()
            .get(key)
            .and_then(|entry| entry.data().cloned())
    }

    /// Inserts or replaces the data for `key`. The entry becomes a fresh success:
    /// its invalidated flag is cleared.
    pub fn set_data(&self, key: QueryKey, data: V) {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(entry) => entry.set_data(data, now),
            None => {
                let entry = QueryEntry::with_data(key.clone(), data, now);
                entries.insert(key, entry);
            }
        }
    }

    /// Removes the entry for `key` and returns it.
    pub fn remove(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.entries.write().remove(key)
    }

    /// Returns `Some(true)` if the entry for `key` is invalidated, has no data,
    /// or is older than the stale time. `None` if there is no such entry.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(key)
            .map(|entry| entry.is_invalidated() || entry.is_expired(self.stale_time, now))
    }

    /// Returns the data for `key` if it can be served without fetching: the entry
    /// has data, is not invalidated, is within the stale time, and has no fetch
    /// in flight.
    pub(crate) fn fresh_data(&self, key: &QueryKey) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_invalidated() || entry.is_fetching() || entry.is_expired(self.stale_time, now)
        {
            return None;
        }
        entry.data().cloned()
    }

    /// Stores the result of a successful fetch that began at `started`. The
    /// entry stays invalidated if it was invalidated while the fetch was in
    /// flight. The entry is recreated if it was removed in the meantime.
    pub(crate) fn complete_fetch(&self, key: &QueryKey, data: V, started: FetchEpoch) {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) => entry.complete_fetch(data, now, started.0),
            None => {
                let entry = QueryEntry::with_data(key.clone(), data, now);
                entries.insert(key.clone(), entry);
            }
        }
    }
}
