//! Notifications about state changes of cached queries.
//!
//! A presentation layer that renders query data can register an
//! [`EventListener`][event-listener] with the client builder to learn when it
//! needs to re-read an entry.
//!
//! [event-listener]: ./type.EventListener.html

pub(crate) mod notifier;

use std::sync::Arc;

use crate::QueryKey;

/// A listener called with the key and the kind of every state change of a cached
/// query.
///
/// The listener is called after the change has been applied to the store and
/// while no lock of the store is held, so it may read the client. If the listener
/// panics, it is disabled and will not be called again. Enable the `logging`
/// feature to get the panic message logged.
pub type EventListener = Arc<dyn Fn(&QueryKey, QueryEvent) + Send + Sync + 'static>;

/// The kind of a state change of a cached query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryEvent {
    /// A fetch function started running for the key.
    FetchStarted,
    /// The data was replaced by a successful fetch or a direct write.
    Updated,
    /// A fetch failed. If the entry had data, the data was kept.
    FetchFailed,
    /// The entry was marked invalidated.
    Invalidated,
    /// The entry was removed.
    Removed,
}
