use super::{error::ConfigurationError, key::QueryKey};
use crate::mutation::MutationDescriptor;

use std::{collections::HashMap, sync::Arc};

/// Static configuration mapping mutation names to the query key prefixes they
/// invalidate when they succeed.
///
/// A map is immutable once built. Looking up a mutation that has no entry is not
/// an error; it means the mutation invalidates nothing.
///
/// # Examples
///
/// Targets can be given by query name, after registering the key prefix of each
/// named query, or directly as key prefixes:
///
/// ```rust
/// use qcache::{query_key, InvalidationMap};
///
/// let map = InvalidationMap::builder()
///     .query("listPets", query_key!["pets", "list"])
///     .query("showPetById", query_key!["pets", "detail"])
///     // After creating a pet, invalidate the pets list.
///     .mutation("createPets", ["listPets"])
///     // After uploading a file, invalidate multiple queries.
///     .mutation("uploadFile", ["listPets", "showPetById"])
///     .mutation_keys("deletePets", [query_key!["pets"]])
///     .build();
///
/// assert_eq!(map.targets("createPets"), &[query_key!["pets", "list"]]);
/// assert_eq!(map.targets("uploadFile").len(), 2);
/// assert!(map.targets("updatePet").is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InvalidationMap {
    targets: HashMap<Arc<str>, Arc<[QueryKey]>>,
    issues: Vec<ConfigurationError>,
}

impl InvalidationMap {
    pub fn builder() -> InvalidationMapBuilder {
        InvalidationMapBuilder::default()
    }

    /// Returns the prefixes invalidated by the mutation `name`, in configuration
    /// order, or `None` if the mutation has no entry.
    pub fn get(&self, name: &str) -> Option<&[QueryKey]> {
        self.targets.get(name).map(|targets| &targets[..])
    }

    /// Like [`get`](#method.get) but returns an empty slice for unknown mutations.
    pub fn targets(&self, name: &str) -> &[QueryKey] {
        self.get(name).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Returns the malformed entries that were dropped while building this map.
    pub fn issues(&self) -> &[ConfigurationError] {
        &self.issues
    }

    /// Returns a descriptor for the mutation `name` carrying its configured
    /// targets. A mutation without an entry gets a descriptor with no targets.
    pub fn descriptor(&self, name: &str) -> MutationDescriptor {
        match self.targets.get_key_value(name) {
            Some((name, targets)) => {
                MutationDescriptor::from_parts(Arc::clone(name), Arc::clone(targets))
            }
            None => MutationDescriptor::new(name),
        }
    }
}

enum Target {
    Query(String),
    Key(QueryKey),
}

/// Builds an [`InvalidationMap`][invalidation-map].
///
/// Queries may be registered before or after the mutations that refer to them;
/// names are resolved when the map is built. Registering the same mutation more
/// than once appends to its targets. Duplicate targets are collapsed, keeping the
/// first occurrence.
///
/// [invalidation-map]: ./struct.InvalidationMap.html
#[derive(Default)]
pub struct InvalidationMapBuilder {
    queries: HashMap<String, QueryKey>,
    mutations: Vec<(String, Vec<Target>)>,
}

impl InvalidationMapBuilder {
    /// Registers the key prefix of a named query.
    pub fn query(mut self, name: impl Into<String>, prefix: QueryKey) -> Self {
        self.queries.insert(name.into(), prefix);
        self
    }

    /// Makes the mutation `name` invalidate the named queries.
    pub fn mutation<I, Q>(self, name: impl Into<String>, queries: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        let targets = queries.into_iter().map(|q| Target::Query(q.into()));
        self.push_targets(name.into(), targets)
    }

    /// Makes the mutation `name` invalidate the given key prefixes.
    pub fn mutation_keys<I>(self, name: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = QueryKey>,
    {
        self.push_targets(name.into(), prefixes.into_iter().map(Target::Key))
    }

    /// Builds the map. Malformed entries are dropped and can be inspected through
    /// [`InvalidationMap::issues`][issues]. With the `logging` feature enabled,
    /// each dropped entry is logged as a warning.
    ///
    /// [issues]: ./struct.InvalidationMap.html#method.issues
    pub fn build(self) -> InvalidationMap {
        let map = self.resolve();

        #[cfg(feature = "logging")]
        for issue in &map.issues {
            log::warn!("Ignored an invalidation map entry: {issue}");
        }

        map
    }

    /// Builds the map, or returns the first malformed entry as an error.
    pub fn try_build(self) -> Result<InvalidationMap, ConfigurationError> {
        let map = self.resolve();
        match map.issues.first() {
            Some(issue) => Err(issue.clone()),
            None => Ok(map),
        }
    }

    fn push_targets(mut self, name: String, targets: impl Iterator<Item = Target>) -> Self {
        match self.mutations.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.extend(targets),
            None => self.mutations.push((name, targets.collect())),
        }
        self
    }

    fn resolve(self) -> InvalidationMap {
        let Self { queries, mutations } = self;
        let mut targets = HashMap::with_capacity(mutations.len());
        let mut issues = Vec::new();

        for (mutation, raw_targets) in mutations {
            if mutation.is_empty() {
                issues.push(ConfigurationError::EmptyMutationName);
                continue;
            }

            let mut prefixes: Vec<QueryKey> = Vec::with_capacity(raw_targets.len());
            for target in raw_targets {
                let prefix = match target {
                    Target::Key(key) => key,
                    Target::Query(query) => match queries.get(&query) {
                        Some(key) => key.clone(),
                        None => {
                            issues.push(ConfigurationError::UnknownQuery {
                                mutation: mutation.clone(),
                                query,
                            });
                            continue;
                        }
                    },
                };

                if prefix.is_empty() {
                    issues.push(ConfigurationError::EmptyPrefix {
                        mutation: mutation.clone(),
                    });
                } else if !prefixes.contains(&prefix) {
                    prefixes.push(prefix);
                }
            }

            targets.insert(Arc::from(mutation), Arc::from(prefixes));
        }

        InvalidationMap { targets, issues }
    }
}
