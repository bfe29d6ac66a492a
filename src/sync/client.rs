use super::{
    value_initializer::{FetchResult, ValueInitializer},
    QueryClientBuilder,
};
use crate::{
    common::base_client::BaseClient,
    mutation::{MutationDescriptor, MutationOptions},
    notification::EventListener,
    stats::ClientStats,
    FetchError, InvalidationMap, MutationError, QueryEntry, QueryKey,
};

use std::{fmt, sync::Arc, time::Duration};

/// A thread-safe, blocking query client.
///
/// `QueryClient` caches the results of fetch closures keyed by
/// [`QueryKey`][query-key]. Concurrent fetches of the same key from different
/// threads run the closure once; the other threads block until its result is
/// available. A successful mutation invalidates the cached queries listed in its
/// [`MutationDescriptor`][descriptor].
///
/// # Examples
///
/// ```rust
/// use qcache::{query_key, sync::QueryClient, InvalidationMap};
/// use std::thread;
///
/// let client: QueryClient<Vec<String>> = QueryClient::builder()
///     .invalidation_map(
///         InvalidationMap::builder()
///             .query("listPets", query_key!["pets", "list"])
///             .mutation("createPets", ["listPets"])
///             .build(),
///     )
///     .build();
///
/// let key = query_key!["pets", "list"];
///
/// // Fetch from several threads. Only one of the closures runs.
/// let threads: Vec<_> = (0..4)
///     .map(|_| {
///         let client = client.clone();
///         let key = key.clone();
///         thread::spawn(move || {
///             client.fetch(&key, || Ok::<_, std::io::Error>(vec!["Rex".to_string()]))
///         })
///     })
///     .collect();
/// for t in threads {
///     assert_eq!(t.join().unwrap().unwrap(), vec!["Rex".to_string()]);
/// }
///
/// let create_pets = client.descriptor("createPets");
/// client
///     .mutate(&create_pets, "Bella", |_name| Ok::<_, std::io::Error>(()))
///     .unwrap();
/// assert_eq!(client.is_stale(&key), Some(true));
/// ```
///
/// [query-key]: ../struct.QueryKey.html
/// [descriptor]: ../mutation/struct.MutationDescriptor.html
pub struct QueryClient<V> {
    base: Arc<BaseClient<V>>,
    value_initializer: Arc<ValueInitializer<V>>,
}

impl<V> Clone for QueryClient<V> {
    /// Makes a clone of this shared client.
    ///
    /// This operation is cheap as it only creates thread-safe reference counted
    /// pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
            value_initializer: Arc::clone(&self.value_initializer),
        }
    }
}

impl<V> fmt::Debug for QueryClient<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("name", &self.base.name())
            .field("entry_count", &self.base.store().len())
            .field("stale_time", &self.base.store().stale_time())
            .field("mutations", &self.base.invalidation_map().len())
            .finish()
    }
}

impl<V> QueryClient<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new `QueryClient<V>` without invalidation rules.
    ///
    /// To adjust various configuration knobs such as `invalidation_map` or
    /// `stale_time`, use the [`QueryClientBuilder`][builder-struct].
    ///
    /// [builder-struct]: ./struct.QueryClientBuilder.html
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a [`QueryClientBuilder`][builder-struct], which can build a
    /// `QueryClient` with various configuration knobs.
    ///
    /// [builder-struct]: ./struct.QueryClientBuilder.html
    pub fn builder() -> QueryClientBuilder<QueryClient<V>> {
        QueryClientBuilder::default()
    }

    pub(crate) fn with_everything(
        name: Option<String>,
        invalidation_map: InvalidationMap,
        stale_time: Option<Duration>,
        event_listener: Option<EventListener>,
        clock: Option<quanta::Clock>,
    ) -> Self {
        Self {
            base: Arc::new(BaseClient::new(
                name,
                invalidation_map,
                stale_time,
                event_listener,
                clock,
            )),
            value_initializer: Arc::new(ValueInitializer::default()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.base.name()
    }

    pub fn stale_time(&self) -> Option<Duration> {
        self.base.store().stale_time()
    }

    pub fn invalidation_map(&self) -> &InvalidationMap {
        self.base.invalidation_map()
    }

    /// Returns the number of cached queries, including pending placeholders of
    /// fetches in flight.
    pub fn entry_count(&self) -> usize {
        self.base.store().len()
    }

    pub fn contains_query(&self, key: &QueryKey) -> bool {
        self.base.store().contains_key(key)
    }

    pub fn query_keys(&self) -> Vec<QueryKey> {
        self.base.store().keys()
    }

    /// Returns the data of the query `key`, calling `fetch` only if the cached
    /// data cannot be served.
    ///
    /// Cached data is served when it exists, is not invalidated, is not older
    /// than the stale time, and no fetch is in flight for the key.
    ///
    /// If other threads call this method for the same key at the same time, only
    /// one of the `fetch` closures is called, and the other threads block until
    /// its result is available. An error is shared by every blocked thread as a
    /// [`FetchError`][fetch-error]. A failed fetch keeps previously cached data
    /// and sets the status of the entry to `Error`; if the key had no data, no
    /// entry is left behind.
    ///
    /// # Panics
    ///
    /// This method panics when the `fetch` closure has panicked. The blocked
    /// threads retry with their own closures.
    ///
    /// [fetch-error]: ../struct.FetchError.html
    pub fn fetch<F, E>(&self, key: &QueryKey, fetch: F) -> Result<V, FetchError<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: Send + Sync + 'static,
    {
        self.fetch_inner(key, false, fetch)
    }

    /// Like [`fetch`](#method.fetch) but discards the data.
    pub fn prefetch<F, E>(&self, key: &QueryKey, fetch: F) -> Result<(), FetchError<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: Send + Sync + 'static,
    {
        self.fetch_inner(key, false, fetch).map(|_| ())
    }

    /// Calls `fetch` even if fresh data is cached. Concurrent fetches of the same
    /// key are still coalesced.
    pub fn refetch<F, E>(&self, key: &QueryKey, fetch: F) -> Result<V, FetchError<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: Send + Sync + 'static,
    {
        self.fetch_inner(key, true, fetch)
    }

    pub fn get_query(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.base.get_query(key)
    }

    /// Returns the cached data for `key`, stale or not. Never fetches.
    pub fn get_query_data(&self, key: &QueryKey) -> Option<V> {
        self.base.get_query_data(key)
    }

    pub fn set_query_data(&self, key: QueryKey, data: V) {
        self.base.set_query_data(key, data);
    }

    /// Marks every cached query whose key starts with `prefix` as invalidated
    /// and returns the number of matched queries. Never creates entries.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        self.base.invalidate_queries(prefix)
    }

    pub fn invalidate_all(&self) -> usize {
        self.base.invalidate_all()
    }

    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.base.store().is_stale(key)
    }

    pub fn remove_query(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.base.remove_query(key)
    }

    pub fn clear(&self) {
        self.base.clear();
    }

    pub fn descriptor(&self, name: &str) -> MutationDescriptor {
        self.base.descriptor(name)
    }

    /// Calls `mutate_fn` once with `variables`. If it succeeds, every target of
    /// `descriptor` is invalidated before this method returns.
    pub fn mutate<A, R, E, F>(
        &self,
        descriptor: &MutationDescriptor,
        variables: A,
        mutate_fn: F,
    ) -> Result<R, MutationError<E>>
    where
        A: Clone,
        F: FnOnce(A) -> Result<R, E>,
    {
        self.mutate_with_options(descriptor, &MutationOptions::default(), variables, mutate_fn)
    }

    /// Like [`mutate`](#method.mutate), then calls the callbacks of `options`.
    /// `on_success` is called after the targets have been invalidated.
    pub fn mutate_with_options<A, R, E, F>(
        &self,
        descriptor: &MutationDescriptor,
        options: &MutationOptions<A, R, E, V>,
        variables: A,
        mutate_fn: F,
    ) -> Result<R, MutationError<E>>
    where
        A: Clone,
        F: FnOnce(A) -> Result<R, E>,
    {
        let invocation_id = self.base.next_invocation_id();
        let result = mutate_fn(variables.clone());
        self.base
            .settle_mutation(descriptor, options, invocation_id, &variables, result)
    }

    pub fn stats(&self) -> ClientStats {
        self.base.stats()
    }

    fn fetch_inner<E>(
        &self,
        key: &QueryKey,
        force: bool,
        fetch: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, FetchError<E>>
    where
        E: Send + Sync + 'static,
    {
        if !force {
            if let Some(value) = self.base.cached(key) {
                return Ok(value);
            }
        }

        match self
            .value_initializer
            .try_fetch_or_read(key, &self.base, force, fetch)
        {
            FetchResult::Fetched(value) | FetchResult::ReadExisting(value) => Ok(value),
            FetchResult::FetchErr(e) => Err(FetchError::new(key.clone(), e)),
        }
    }
}

impl<V> Default for QueryClient<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
