use super::{
    error::MutationError,
    invalidation::InvalidationMap,
    key::QueryKey,
    stats_counter::StatsCounter,
    store::{FailedFetch, FetchEpoch, QueryStore},
    time::{self, Clock, Instant},
};
use crate::{
    mutation::{MutationContext, MutationDescriptor, MutationOptions},
    notification::{notifier::EventNotifier, EventListener, QueryEvent},
    stats::ClientStats,
    QueryEntry,
};

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// A fetch started by [`BaseClient::start_fetch`]. Passed back when the fetch
/// finishes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct InFlightFetch {
    started_at: Instant,
    epoch: FetchEpoch,
}

/// The state shared by the `future` and `sync` query clients: the store, the
/// invalidation configuration, the event notifier and the statistics.
///
/// Every state change goes through here so that events and statistics are
/// recorded the same way for both clients. Listeners are always notified after
/// the store lock has been released.
pub(crate) struct BaseClient<V> {
    name: Option<String>,
    store: QueryStore<V>,
    invalidation_map: InvalidationMap,
    notifier: Option<EventNotifier>,
    stats: StatsCounter,
    clock: Clock,
    next_invocation_id: AtomicU64,
}

impl<V> BaseClient<V> {
    pub(crate) fn new(
        name: Option<String>,
        invalidation_map: InvalidationMap,
        stale_time: Option<Duration>,
        event_listener: Option<EventListener>,
        clock: Option<Clock>,
    ) -> Self {
        let clock = clock.unwrap_or_else(Clock::new);
        let notifier = event_listener.map(|listener| EventNotifier::new(listener, name.clone()));
        Self {
            store: QueryStore::with_clock(clock.clone(), stale_time),
            name,
            invalidation_map,
            notifier,
            stats: StatsCounter::default(),
            clock,
            next_invocation_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn store(&self) -> &QueryStore<V> {
        &self.store
    }

    pub(crate) fn invalidation_map(&self) -> &InvalidationMap {
        &self.invalidation_map
    }

    pub(crate) fn stats(&self) -> ClientStats {
        self.stats.snapshot()
    }

    pub(crate) fn descriptor(&self, mutation: &str) -> MutationDescriptor {
        self.invalidation_map.descriptor(mutation)
    }

    pub(crate) fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        let (matched, newly_invalidated) = self.store.invalidate_matching(prefix);
        self.stats.record_invalidations(newly_invalidated.len());
        for key in &newly_invalidated {
            self.notify(key, QueryEvent::Invalidated);
        }
        matched
    }

    pub(crate) fn invalidate_all(&self) -> usize {
        self.invalidate_queries(&QueryKey::new())
    }

    pub(crate) fn clear(&self) {
        for key in self.store.drain() {
            self.notify(&key, QueryEvent::Removed);
        }
    }

    pub(crate) fn record_hit(&self) {
        self.stats.record_hit();
    }

    /// Flags the entry as fetching, creating a pending placeholder if needed.
    pub(crate) fn start_fetch(&self, key: &QueryKey) -> InFlightFetch {
        self.stats.record_miss();
        let epoch = self.store.begin_fetch(key);
        self.notify(key, QueryEvent::FetchStarted);
        InFlightFetch {
            started_at: self.clock.now(),
            epoch,
        }
    }

    pub(crate) fn fail_fetch(&self, key: &QueryKey, in_flight: InFlightFetch) {
        self.stats.record_fetch_failure(time::elapsed_nanos(
            &self.clock,
            in_flight.started_at,
        ));

        #[cfg(feature = "logging")]
        log::debug!("{}Fetch for query {key} failed", self.log_prefix());

        match self.store.fail_fetch(key) {
            FailedFetch::Kept => self.notify(key, QueryEvent::FetchFailed),
            FailedFetch::Removed => {
                self.notify(key, QueryEvent::FetchFailed);
                self.notify(key, QueryEvent::Removed);
            }
            FailedFetch::Missing => (),
        }
    }

    /// Called when a fetch will never complete because its future was dropped or
    /// its function panicked.
    pub(crate) fn abandon_fetch(&self, key: &QueryKey) {
        if self.store.abandon_fetch(key) {
            self.notify(key, QueryEvent::Removed);
        }
    }

    pub(crate) fn next_invocation_id(&self) -> u64 {
        self.next_invocation_id.fetch_add(1, Ordering::AcqRel)
    }

    fn notify(&self, key: &QueryKey, event: QueryEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(key, event);
        }
    }

    #[cfg(feature = "logging")]
    fn log_prefix(&self) -> String {
        self.name
            .as_deref()
            .map(|name| format!("[{name}] "))
            .unwrap_or_default()
    }
}

impl<V> BaseClient<V>
where
    V: Clone,
{
    pub(crate) fn get_query(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.store.get(key)
    }

    pub(crate) fn get_query_data(&self, key: &QueryKey) -> Option<V> {
        self.store.get_data(key)
    }

    pub(crate) fn set_query_data(&self, key: QueryKey, data: V) {
        self.store.set_data(key.clone(), data);
        self.notify(&key, QueryEvent::Updated);
    }

    pub(crate) fn remove_query(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        let removed = self.store.remove(key);
        if removed.is_some() {
            self.notify(key, QueryEvent::Removed);
        }
        removed
    }

    pub(crate) fn fresh_data(&self, key: &QueryKey) -> Option<V> {
        self.store.fresh_data(key)
    }

    /// Returns fresh cached data for `key`, recording a hit.
    pub(crate) fn cached(&self, key: &QueryKey) -> Option<V> {
        let value = self.store.fresh_data(key)?;
        self.stats.record_hit();
        Some(value)
    }

    /// Stores a fetched value. Invalidations that happened while the fetch was
    /// in flight are kept, so the next read fetches again.
    pub(crate) fn finish_fetch(&self, key: &QueryKey, value: V, in_flight: InFlightFetch) {
        self.stats.record_fetch_success(time::elapsed_nanos(
            &self.clock,
            in_flight.started_at,
        ));
        self.store.complete_fetch(key, value, in_flight.epoch);
        self.notify(key, QueryEvent::Updated);
    }

    /// Runs the post-mutation pipeline for a finished mutation function.
    ///
    /// On success every target of the descriptor is invalidated before the
    /// success callback runs. On failure nothing is invalidated.
    pub(crate) fn settle_mutation<A, R, E>(
        &self,
        descriptor: &MutationDescriptor,
        options: &MutationOptions<A, R, E, V>,
        invocation_id: u64,
        variables: &A,
        result: Result<R, E>,
    ) -> Result<R, MutationError<E>> {
        let context = MutationContext::new(self, descriptor, invocation_id);
        match result {
            Ok(value) => {
                for prefix in descriptor.targets() {
                    self.invalidate_queries(prefix);
                }
                self.stats.record_mutation(true);
                options.succeeded(&value, variables, &context);
                Ok(value)
            }
            Err(error) => {
                self.stats.record_mutation(false);

                #[cfg(feature = "logging")]
                log::debug!(
                    "{}Mutation `{}` (invocation {invocation_id}) failed",
                    self.log_prefix(),
                    descriptor.name()
                );

                options.failed(&error, variables, &context);
                Err(MutationError::new(descriptor.shared_name(), error))
            }
        }
    }
}
