use super::QueryClient;
use crate::{
    common::builder_utils,
    notification::{EventListener, QueryEvent},
    InvalidationMap, QueryKey,
};

use std::{marker::PhantomData, sync::Arc, time::Duration};

/// Builds a [`QueryClient`][client-struct] with various configuration knobs.
///
/// [client-struct]: ./struct.QueryClient.html
///
/// # Examples
///
/// ```rust
/// use qcache::{future::QueryClient, query_key, InvalidationMap};
/// use std::time::Duration;
///
/// let map = InvalidationMap::builder()
///     .query("listPets", query_key!["pets", "list"])
///     .mutation("createPets", ["listPets"])
///     .build();
///
/// let client: QueryClient<Vec<String>> = QueryClient::builder()
///     .name("pets")
///     .invalidation_map(map)
///     // Re-fetch data older than 5 minutes even without an invalidation.
///     .stale_time(Duration::from_secs(5 * 60))
///     .build();
///
/// assert_eq!(client.name(), Some("pets"));
/// assert_eq!(client.stale_time(), Some(Duration::from_secs(5 * 60)));
/// ```
#[must_use]
pub struct QueryClientBuilder<C> {
    name: Option<String>,
    invalidation_map: InvalidationMap,
    stale_time: Option<Duration>,
    event_listener: Option<EventListener>,
    clock: Option<quanta::Clock>,
    client_type: PhantomData<C>,
}

impl<V> Default for QueryClientBuilder<QueryClient<V>>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            name: None,
            invalidation_map: InvalidationMap::default(),
            stale_time: None,
            event_listener: None,
            clock: None,
            client_type: PhantomData,
        }
    }
}

impl<V> QueryClientBuilder<QueryClient<V>>
where
    V: Clone + Send + Sync + 'static,
{
    /// Construct a new `QueryClientBuilder` with no invalidation rules, no stale
    /// time and no event listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `QueryClient<V>`.
    ///
    /// # Panics
    ///
    /// Panics if the configured stale time is longer than 1000 years.
    pub fn build(self) -> QueryClient<V> {
        builder_utils::ensure_stale_time_or_panic(self.stale_time);
        QueryClient::with_everything(
            self.name,
            self.invalidation_map,
            self.stale_time,
            self.event_listener,
            self.clock,
        )
    }
}

impl<C> QueryClientBuilder<C> {
    /// Sets the name of the client. The name is used in log messages.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the invalidation rules applied by `mutate`.
    pub fn invalidation_map(self, map: InvalidationMap) -> Self {
        Self {
            invalidation_map: map,
            ..self
        }
    }

    /// Sets the stale time of the client.
    ///
    /// Data older than the specified duration past its last successful fetch is
    /// re-fetched by `fetch`, even if it was never invalidated.
    pub fn stale_time(self, duration: Duration) -> Self {
        Self {
            stale_time: Some(duration),
            ..self
        }
    }

    /// Sets the event listener closure.
    ///
    /// The listener is called after every state change of a cached query, outside
    /// of any internal lock. If it panics, it is disabled for the rest of the life
    /// of the client.
    pub fn event_listener(
        self,
        listener: impl Fn(&QueryKey, QueryEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            event_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Sets the clock used to stamp entries. Meant for tests, with a mock clock
    /// created by `quanta::Clock::mock`.
    #[doc(hidden)]
    pub fn clock(self, clock: quanta::Clock) -> Self {
        Self {
            clock: Some(clock),
            ..self
        }
    }
}
