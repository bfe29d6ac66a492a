#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! qcache is a client-side query cache with declarative, mutation-triggered
//! invalidation.
//!
//! Query results are cached by hierarchical [`QueryKey`][query-key]s such as
//! `["pets", "list", {"limit": 10}]`. A static [`InvalidationMap`][map] names,
//! for every mutation, the key prefixes to invalidate when the mutation
//! succeeds. The query clients apply it automatically: after a successful
//! `mutate`, every cached query under the configured prefixes is marked stale,
//! and the next `fetch` of such a query runs its fetch function again.
//!
//! qcache provides two query clients:
//!
//! - [`future::QueryClient`][future-client] for async code. Fetch functions are
//!   futures. (Requires the crate feature "future", enabled by default.)
//! - [`sync::QueryClient`][sync-client] for blocking code. Fetch functions are
//!   closures. (Requires the crate feature "sync", enabled by default.)
//!
//! Both clients:
//!
//! - Are thread-safe and cheap to clone.
//! - Serve fresh cached data without running the fetch function.
//! - Coalesce concurrent fetches of the same key into a single call of the
//!   fetch function.
//! - Keep previously cached data when a re-fetch fails.
//! - Run mutation callbacks (`on_success`, `on_error`, `on_settled`) after the
//!   invalidation, so `on_success` always sees the targets invalidated.
//! - Optionally treat data older than a stale time as stale.
//! - Report state changes to an optional event listener.
//!
//! # Example
//!
//! ```rust
//! use qcache::{query_key, sync::QueryClient, InvalidationMap, KeyPart};
//!
//! // createPets: ['listPets']
//! let map = InvalidationMap::builder()
//!     .query("listPets", query_key!["pets", "list"])
//!     .mutation("createPets", ["listPets"])
//!     .build();
//!
//! let client: QueryClient<Vec<String>> = QueryClient::builder()
//!     .invalidation_map(map)
//!     .build();
//!
//! let key = query_key!["pets", "list", KeyPart::map([("limit", 10)])];
//! client.set_query_data(key.clone(), vec!["Rex".to_string()]);
//!
//! client
//!     .mutate(&client.descriptor("createPets"), "Bella", |_| Ok::<_, ()>(()))
//!     .unwrap();
//!
//! let entry = client.get_query(&key).unwrap();
//! assert!(entry.is_invalidated());
//! assert_eq!(entry.data(), Some(&vec!["Rex".to_string()]));
//! ```
//!
//! # Minimum Supported Rust Versions
//!
//! This crate's minimum supported Rust version (MSRV) is 1.65.
//!
//! [query-key]: ./struct.QueryKey.html
//! [map]: ./struct.InvalidationMap.html
//! [future-client]: ./future/struct.QueryClient.html
//! [sync-client]: ./sync/struct.QueryClient.html

#[cfg(feature = "future")]
#[cfg_attr(docsrs, doc(cfg(feature = "future")))]
pub mod future;

#[cfg(feature = "sync")]
#[cfg_attr(docsrs, doc(cfg(feature = "sync")))]
pub mod sync;

#[cfg_attr(not(any(feature = "future", feature = "sync")), allow(dead_code))]
pub(crate) mod common;

pub mod mutation;
pub mod notification;
pub mod stats;

pub use common::{
    entry::{QueryEntry, QueryStatus},
    error::{ConfigurationError, FetchError, MutationError},
    invalidation::{InvalidationMap, InvalidationMapBuilder},
    key::{KeyPart, QueryKey},
    store::QueryStore,
    time::Instant,
};
