use std::{error::Error, fmt, sync::Arc};

use super::key::QueryKey;

/// The error returned by the `fetch` family of methods when the fetch function
/// failed.
///
/// Callers whose requests were de-duplicated into a single fetch all receive the
/// same underlying error, so it is shared through an `Arc`.
pub struct FetchError<E> {
    key: QueryKey,
    source: Arc<E>,
}

impl<E> FetchError<E> {
    pub(crate) fn new(key: QueryKey, source: Arc<E>) -> Self {
        Self { key, source }
    }

    /// The key of the query that failed.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The error returned by the fetch function.
    pub fn inner(&self) -> &Arc<E> {
        &self.source
    }

    pub fn into_inner(self) -> Arc<E> {
        self.source
    }
}

impl<E> Clone for FetchError<E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            source: Arc::clone(&self.source),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for FetchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchError")
            .field("key", &self.key)
            .field("source", &self.source)
            .finish()
    }
}

impl<E: fmt::Display> fmt::Display for FetchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to fetch query {}: {}", self.key, self.source)
    }
}

impl<E> Error for FetchError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}

/// The error returned by the `mutate` family of methods when the mutation
/// function failed. No query was invalidated.
pub struct MutationError<E> {
    mutation: Arc<str>,
    source: E,
}

impl<E> MutationError<E> {
    pub(crate) fn new(mutation: Arc<str>, source: E) -> Self {
        Self { mutation, source }
    }

    /// The name of the failed mutation.
    pub fn mutation(&self) -> &str {
        &self.mutation
    }

    /// The error returned by the mutation function.
    pub fn inner(&self) -> &E {
        &self.source
    }

    pub fn into_inner(self) -> E {
        self.source
    }
}

impl<E: fmt::Debug> fmt::Debug for MutationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationError")
            .field("mutation", &self.mutation)
            .field("source", &self.source)
            .finish()
    }
}

impl<E: fmt::Display> fmt::Display for MutationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mutation `{}` failed: {}", self.mutation, self.source)
    }
}

impl<E> Error for MutationError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// A malformed entry in an [`InvalidationMap`][invalidation-map] configuration.
///
/// [`InvalidationMapBuilder::build`][build] drops malformed entries and keeps
/// them as issues (see [`InvalidationMap::issues`][issues]), so they turn into
/// no-op invalidations. [`InvalidationMapBuilder::try_build`][try-build] returns
/// the first one as an error instead.
///
/// [invalidation-map]: ./struct.InvalidationMap.html
/// [build]: ./struct.InvalidationMapBuilder.html#method.build
/// [try-build]: ./struct.InvalidationMapBuilder.html#method.try_build
/// [issues]: ./struct.InvalidationMap.html#method.issues
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A mutation was registered with an empty name.
    #[error("mutation name must not be empty")]
    EmptyMutationName,

    /// An invalidation target is the empty key, which would match every query.
    #[error("mutation `{mutation}` has an empty invalidation prefix")]
    EmptyPrefix { mutation: String },

    /// An invalidation target refers to a query name that was never registered.
    #[error("mutation `{mutation}` refers to unknown query `{query}`")]
    UnknownQuery { mutation: String, query: String },
}
