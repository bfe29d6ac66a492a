use std::{fmt::Debug, time::Duration};

use super::{key::QueryKey, time::Instant};

/// The outcome of the most recent fetch of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// The query has never completed a fetch. It has no data.
    Pending,
    /// The last fetch succeeded, or the data was set directly.
    Success,
    /// The last fetch failed. Data from an earlier success may still be present.
    Error,
}

/// A snapshot of a single entry in a [`QueryStore`][query-store].
///
/// `QueryEntry` is returned by `get` methods of the store and the clients. It
/// holds the key, the cached data (if any) and the state of the entry at the time
/// it was taken. Later changes to the store are not reflected in a snapshot.
///
/// [query-store]: ./struct.QueryStore.html
#[derive(Clone)]
pub struct QueryEntry<V> {
    key: QueryKey,
    data: Option<V>,
    status: QueryStatus,
    is_invalidated: bool,
    is_fetching: bool,
    data_updated_at: Option<Instant>,
    error_updated_at: Option<Instant>,
    fetch_failure_count: u32,
    // Store epoch of the most recent invalidation.
    invalidated_epoch: u64,
}

impl<V> Debug for QueryEntry<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEntry")
            .field("key", &self.key)
            .field("data", &self.data)
            .field("status", &self.status)
            .field("is_invalidated", &self.is_invalidated)
            .field("is_fetching", &self.is_fetching)
            .field("fetch_failure_count", &self.fetch_failure_count)
            .finish()
    }
}

impl<V> QueryEntry<V> {
    /// A placeholder for a query whose first fetch is in flight.
    pub(crate) fn pending(key: QueryKey) -> Self {
        Self {
            key,
            data: None,
            status: QueryStatus::Pending,
            is_invalidated: false,
            is_fetching: true,
            data_updated_at: None,
            error_updated_at: None,
            fetch_failure_count: 0,
            invalidated_epoch: 0,
        }
    }

    pub(crate) fn with_data(key: QueryKey, data: V, now: Instant) -> Self {
        Self {
            key,
            data: Some(data),
            status: QueryStatus::Success,
            is_invalidated: false,
            is_fetching: false,
            data_updated_at: Some(now),
            error_updated_at: None,
            fetch_failure_count: 0,
            invalidated_epoch: 0,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn data(&self) -> Option<&V> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<V> {
        self.data
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// Returns `true` if the entry was marked stale by an invalidation and no
    /// fetch that began after the invalidation has succeeded since.
    pub fn is_invalidated(&self) -> bool {
        self.is_invalidated
    }

    /// Returns `true` if a fetch for this key was in flight when the snapshot was
    /// taken.
    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    /// The time the data was last replaced by a successful fetch or a direct
    /// write. `None` if the entry never had data.
    pub fn data_updated_at(&self) -> Option<Instant> {
        self.data_updated_at
    }

    pub fn error_updated_at(&self) -> Option<Instant> {
        self.error_updated_at
    }

    /// The number of failed fetches since the last success.
    pub fn fetch_failure_count(&self) -> u32 {
        self.fetch_failure_count
    }

    pub(crate) fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Returns `true` if the data is older than `stale_time` at `now`. An entry
    /// without data is always stale.
    pub(crate) fn is_expired(&self, stale_time: Option<Duration>, now: Instant) -> bool {
        match (self.data_updated_at, stale_time) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(updated_at), Some(stale_time)) => {
                now.saturating_duration_since(updated_at) >= stale_time
            }
        }
    }

    pub(crate) fn set_data(&mut self, data: V, now: Instant) {
        self.data = Some(data);
        self.status = QueryStatus::Success;
        self.is_invalidated = false;
        self.is_fetching = false;
        self.data_updated_at = Some(now);
        self.fetch_failure_count = 0;
    }

    /// Stores the result of a fetch that started at `started_epoch`. The
    /// invalidated flag is kept if the entry was invalidated after that.
    pub(crate) fn complete_fetch(&mut self, data: V, now: Instant, started_epoch: u64) {
        let invalidated_since = self.is_invalidated && self.invalidated_epoch > started_epoch;
        self.set_data(data, now);
        self.is_invalidated = invalidated_since;
    }

    /// Marks the entry invalidated at `epoch`. Returns `true` if it was not
    /// invalidated yet.
    pub(crate) fn invalidate(&mut self, epoch: u64) -> bool {
        self.invalidated_epoch = epoch;
        !std::mem::replace(&mut self.is_invalidated, true)
    }

    pub(crate) fn start_fetch(&mut self) {
        self.is_fetching = true;
    }

    pub(crate) fn fail_fetch(&mut self, now: Instant) {
        self.status = QueryStatus::Error;
        self.is_fetching = false;
        self.error_updated_at = Some(now);
        self.fetch_failure_count = self.fetch_failure_count.saturating_add(1);
    }

    pub(crate) fn cancel_fetch(&mut self) {
        self.is_fetching = false;
    }
}
