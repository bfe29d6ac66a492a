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
/// use qcache::{notification::QueryEvent, query_key, sync::QueryClient, InvalidationMap};
///
/// let client: QueryClient<u64> = QueryClient::builder()
///     .name("pets")
///     .invalidation_map(
///         InvalidationMap::builder()
///             .mutation_keys("deletePet", [query_key!["pets"]])
///             .build(),
///     )
///     .event_listener(|key, event| {
///         if event == QueryEvent::Invalidated {
///             println!("{key} needs to be re-read");
///         }
///     })
///     .build();
///
/// assert_eq!(client.descriptor("deletePet").targets(), &[query_key!["pets"]]);
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

    /// Sets the event listener closure. It is called on the thread that made
    /// the change, outside of any internal lock.
    pub fn event_listener(
        self,
        listener: impl Fn(&QueryKey, QueryEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            event_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    #[doc(hidden)]
    pub fn clock(self, clock: quanta::Clock) -> Self {
        Self {
            clock: Some(clock),
            ..self
        }
    }
}
