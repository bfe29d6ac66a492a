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

use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Duration};

/// A thread-safe, futures-aware query client.
///
/// `QueryClient` caches the results of fetch futures keyed by
/// [`QueryKey`][query-key], de-duplicates concurrent fetches of the same key, and
/// invalidates cached queries when a mutation succeeds, following the rules of
/// its [`InvalidationMap`][invalidation-map].
///
/// Invalidation only marks entries as stale. The next `fetch` of a stale key runs
/// its fetch future again; until then the stale data can still be read with
/// [`get_query_data`](#method.get_query_data).
///
/// To use this client, enable a crate feature called "future".
///
/// # Example: fetch, mutate and re-fetch
///
/// ```rust
/// // Cargo.toml
/// //
/// // [dependencies]
/// // qcache = { version = "0.1", features = ["future"] }
/// // tokio = { version = "1", features = ["rt-multi-thread", "macros" ] }
///
/// use qcache::{future::QueryClient, query_key, InvalidationMap, KeyPart};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Pet {
///     id: i64,
///     name: String,
/// }
///
/// async fn list_pets(names: &[&str]) -> Result<Vec<Pet>, std::io::Error> {
///     Ok(names
///         .iter()
///         .zip(1..)
///         .map(|(name, id)| Pet { id, name: name.to_string() })
///         .collect())
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let client: QueryClient<Vec<Pet>> = QueryClient::builder()
///         .invalidation_map(
///             InvalidationMap::builder()
///                 .query("listPets", query_key!["pets", "list"])
///                 .mutation("createPets", ["listPets"])
///                 .build(),
///         )
///         .build();
///
///     let key = query_key!["pets", "list", KeyPart::map([("limit", 10)])];
///
///     // The first fetch runs the future and caches its result.
///     let pets = client.fetch(&key, list_pets(&["Rex"])).await.unwrap();
///     assert_eq!(pets.len(), 1);
///
///     // The data is fresh, so the second future is not run.
///     let pets = client.fetch(&key, list_pets(&["Rex", "Bella"])).await.unwrap();
///     assert_eq!(pets.len(), 1);
///
///     // A successful `createPets` invalidates every `["pets", "list", ..]` query.
///     let create_pets = client.descriptor("createPets");
///     client
///         .mutate(&create_pets, "Bella".to_string(), |_name| async {
///             Ok::<_, std::io::Error>(())
///         })
///         .await
///         .unwrap();
///     assert!(client.get_query(&key).unwrap().is_invalidated());
///
///     // The next fetch runs the future again.
///     let pets = client.fetch(&key, list_pets(&["Rex", "Bella"])).await.unwrap();
///     assert_eq!(pets.len(), 2);
/// }
/// ```
///
/// # Sharing a client across asynchronous tasks
///
/// To share a client across async tasks (or OS threads), create a clone of the
/// client by calling its `clone` method and pass the clone to the other task.
/// Cloning is a cheap operation for `QueryClient` as it only creates
/// thread-safe reference-counted pointers to the internal data structures.
///
/// [query-key]: ../struct.QueryKey.html
/// [invalidation-map]: ../struct.InvalidationMap.html
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
    /// Constructs a new `QueryClient<V>` without invalidation rules. Mutations
    /// run through it invalidate only the targets of their descriptors.
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

    /// Returns the name of this client.
    pub fn name(&self) -> Option<&str> {
        self.base.name()
    }

    /// Returns the stale time of this client.
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

    /// Returns the keys of all cached queries, in no particular order.
    pub fn query_keys(&self) -> Vec<QueryKey> {
        self.base.store().keys()
    }

    /// Returns the data of the query `key`, running the `fetch` future only if
    /// the cached data cannot be served.
    ///
    /// Cached data is served when it exists, is not invalidated, is not older
    /// than the stale time, and no fetch is in flight for the key. Otherwise
    /// `fetch` is resolved and its value stored, clearing any invalidation.
    ///
    /// Concurrent calls for the same key are coalesced: only one of the `fetch`
    /// futures is resolved, and the other calls wait for its result. If the
    /// future fails, every waiting call gets the same error wrapped in a
    /// [`FetchError`][fetch-error]. A failed fetch keeps previously cached data
    /// and sets the status of the entry to `Error`; if the key had no data, no
    /// entry is left behind.
    ///
    /// Concurrent calls are coalesced only when they use the same error type `E`.
    ///
    /// # Cancellation
    ///
    /// If the future returned by this method is dropped while its `fetch` future
    /// is being resolved, the fetch is abandoned. A pending placeholder entry is
    /// removed, and one of the waiting calls resolves its own `fetch` future
    /// instead.
    ///
    /// # Panics
    ///
    /// This method panics when the `fetch` future has panicked. The waiting calls
    /// retry with their own futures.
    ///
    /// [fetch-error]: ../struct.FetchError.html
    pub async fn fetch<F, E>(&self, key: &QueryKey, fetch: F) -> Result<V, FetchError<E>>
    where
        F: Future<Output = Result<V, E>>,
        E: Send + Sync + 'static,
    {
        futures_util::pin_mut!(fetch);
        self.fetch_with_pinned(key, false, fetch).await
    }

    /// Like [`fetch`](#method.fetch) but discards the data. Use it to warm the
    /// cache ahead of a read.
    pub async fn prefetch<F, E>(&self, key: &QueryKey, fetch: F) -> Result<(), FetchError<E>>
    where
        F: Future<Output = Result<V, E>>,
        E: Send + Sync + 'static,
    {
        futures_util::pin_mut!(fetch);
        self.fetch_with_pinned(key, false, fetch).await.map(|_| ())
    }

    /// Resolves `fetch` even if fresh data is cached. Concurrent fetches of the
    /// same key are still coalesced.
    pub async fn refetch<F, E>(&self, key: &QueryKey, fetch: F) -> Result<V, FetchError<E>>
    where
        F: Future<Output = Result<V, E>>,
        E: Send + Sync + 'static,
    {
        futures_util::pin_mut!(fetch);
        self.fetch_with_pinned(key, true, fetch).await
    }

    /// Returns a snapshot of the cached entry for `key`. Never fetches.
    pub fn get_query(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.base.get_query(key)
    }

    /// Returns the cached data for `key`, stale or not. Never fetches.
    pub fn get_query_data(&self, key: &QueryKey) -> Option<V> {
        self.base.get_query_data(key)
    }

    /// Writes data for `key` directly, as a successful fetch would. The entry
    /// becomes fresh.
    pub fn set_query_data(&self, key: QueryKey, data: V) {
        self.base.set_query_data(key, data);
    }

    /// Marks every cached query whose key starts with `prefix` as invalidated
    /// and returns the number of matched queries. Never creates entries.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        self.base.invalidate_queries(prefix)
    }

    /// Marks every cached query as invalidated.
    pub fn invalidate_all(&self) -> usize {
        self.base.invalidate_all()
    }

    /// Returns `Some(true)` if the query `key` would be re-fetched by the next
    /// `fetch`. `None` if it is not cached.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.base.store().is_stale(key)
    }

    pub fn remove_query(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.base.remove_query(key)
    }

    /// Removes every cached query.
    pub fn clear(&self) {
        self.base.clear();
    }

    /// Returns the descriptor of the mutation `name`, carrying the targets
    /// configured in the invalidation map of this client. A mutation without
    /// an entry in the map invalidates nothing.
    pub fn descriptor(&self, name: &str) -> MutationDescriptor {
        self.base.descriptor(name)
    }

    /// Runs `mutate_fn` once with `variables`. If it succeeds, every target of
    /// `descriptor` is invalidated before this method returns. If it fails,
    /// nothing is invalidated.
    pub async fn mutate<A, R, E, F, Fut>(
        &self,
        descriptor: &MutationDescriptor,
        variables: A,
        mutate_fn: F,
    ) -> Result<R, MutationError<E>>
    where
        A: Clone,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let options = MutationOptions::default();
        self.mutate_with_options(descriptor, &options, variables, mutate_fn)
            .await
    }

    /// Like [`mutate`](#method.mutate), then runs the callbacks of `options`.
    ///
    /// On success, the targets of `descriptor` are invalidated first, so the
    /// `on_success` callback sees them invalidated; `on_settled` runs last. On
    /// failure, `on_error` and then `on_settled` run, and nothing is
    /// invalidated.
    ///
    /// ```rust
    /// use qcache::{future::QueryClient, mutation::MutationOptions, query_key};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let client: QueryClient<Vec<String>> = QueryClient::new();
    /// client.set_query_data(query_key!["pets", "list"], vec!["Rex".into()]);
    ///
    /// let create_pets = qcache::mutation::MutationDescriptor::new("createPets")
    ///     .invalidates(query_key!["pets", "list"]);
    /// let options = MutationOptions::new().on_success(|_: &(), name: &String, ctx| {
    ///     // The list is already invalidated here.
    ///     let list = ctx.get_query(&query_key!["pets", "list"]).unwrap();
    ///     assert!(list.is_invalidated());
    ///     println!("created {name}");
    /// });
    ///
    /// client
    ///     .mutate_with_options(&create_pets, &options, "Bella".to_string(), |_| async {
    ///         Ok::<_, std::io::Error>(())
    ///     })
    ///     .await
    ///     .unwrap();
    /// # }
    /// ```
    pub async fn mutate_with_options<A, R, E, F, Fut>(
        &self,
        descriptor: &MutationDescriptor,
        options: &MutationOptions<A, R, E, V>,
        variables: A,
        mutate_fn: F,
    ) -> Result<R, MutationError<E>>
    where
        A: Clone,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let invocation_id = self.base.next_invocation_id();
        let result = mutate_fn(variables.clone()).await;
        self.base
            .settle_mutation(descriptor, options, invocation_id, &variables, result)
    }

    /// Returns a snapshot of the statistics of this client.
    pub fn stats(&self) -> ClientStats {
        self.base.stats()
    }

    async fn fetch_with_pinned<E>(
        &self,
        key: &QueryKey,
        force: bool,
        fetch: Pin<&mut impl Future<Output = Result<V, E>>>,
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
            .await
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
