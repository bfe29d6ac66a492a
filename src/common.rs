pub(crate) mod base_client;
pub(crate) mod builder_utils;
pub(crate) mod entry;
pub(crate) mod error;
pub(crate) mod invalidation;
pub(crate) mod key;
pub(crate) mod stats_counter;
pub(crate) mod store;
pub(crate) mod time;

/// The maximum number of times a waiting caller retries after the fetch it was
/// waiting on panicked or was dropped.
#[cfg(any(feature = "sync", feature = "future"))]
pub(crate) const MAX_FETCH_RETRIES: usize = 200;
