//! Mutation descriptors, callbacks and the context handed to them.

use std::{fmt, sync::Arc};

use crate::{common::base_client::BaseClient, QueryEntry, QueryKey};

/// Describes a mutation: its name and the query key prefixes to invalidate when
/// it succeeds.
///
/// Descriptors are immutable. They are usually obtained from the
/// [`InvalidationMap`][invalidation-map] configured on a client (see the
/// `descriptor` method of the clients), but can also be built directly:
///
/// ```rust
/// use qcache::{mutation::MutationDescriptor, query_key};
///
/// let create_pets = MutationDescriptor::new("createPets")
///     .invalidates(query_key!["pets", "list"]);
///
/// assert_eq!(create_pets.name(), "createPets");
/// assert_eq!(create_pets.targets(), &[query_key!["pets", "list"]]);
/// ```
///
/// [invalidation-map]: ../struct.InvalidationMap.html
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationDescriptor {
    name: Arc<str>,
    targets: Arc<[QueryKey]>,
}

impl MutationDescriptor {
    /// Creates a descriptor that invalidates nothing.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            targets: Arc::from(Vec::<QueryKey>::new()),
        }
    }

    pub fn with_targets<I>(name: impl Into<Arc<str>>, targets: I) -> Self
    where
        I: IntoIterator<Item = QueryKey>,
    {
        Self {
            name: name.into(),
            targets: targets.into_iter().collect(),
        }
    }

    pub(crate) fn from_parts(name: Arc<str>, targets: Arc<[QueryKey]>) -> Self {
        Self { name, targets }
    }

    /// Returns a descriptor that additionally invalidates `prefix`.
    pub fn invalidates(self, prefix: QueryKey) -> Self {
        let targets = self
            .targets
            .iter()
            .cloned()
            .chain(std::iter::once(prefix))
            .collect();
        Self {
            name: self.name,
            targets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The prefixes invalidated on success, in order.
    pub fn targets(&self) -> &[QueryKey] {
        &self.targets
    }
}

pub type SuccessCallback<A, R, V> =
    Box<dyn Fn(&R, &A, &MutationContext<'_, V>) + Send + Sync + 'static>;

pub type ErrorCallback<A, E, V> =
    Box<dyn Fn(&E, &A, &MutationContext<'_, V>) + Send + Sync + 'static>;

pub type SettledCallback<A, R, E, V> =
    Box<dyn Fn(Result<&R, &E>, &A, &MutationContext<'_, V>) + Send + Sync + 'static>;

/// User callbacks for a mutation.
///
/// - `on_success` runs after the mutation function succeeded and after every
///   target of the descriptor has been invalidated.
/// - `on_error` runs after the mutation function failed. Nothing was invalidated.
/// - `on_settled` runs last in both cases.
///
/// The type parameters are the mutation variables `A`, the result `R`, the error
/// `E` and the value type `V` of the client.
///
/// ```rust
/// use qcache::{mutation::MutationOptions, query_key};
///
/// let options = MutationOptions::<String, (), std::io::Error, Vec<String>>::new()
///     .on_success(|_result, name, ctx| {
///         let list = ctx.get_query(&query_key!["pets", "list"]);
///         let invalidated = list.map(|entry| entry.is_invalidated());
///         println!("created {name}; list invalidated: {invalidated:?}");
///     });
/// ```
pub struct MutationOptions<A, R, E, V> {
    on_success: Option<SuccessCallback<A, R, V>>,
    on_error: Option<ErrorCallback<A, E, V>>,
    on_settled: Option<SettledCallback<A, R, E, V>>,
}

impl<A, R, E, V> Default for MutationOptions<A, R, E, V> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }
}

impl<A, R, E, V> fmt::Debug for MutationOptions<A, R, E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_settled", &self.on_settled.is_some())
            .finish()
    }
}

impl<A, R, E, V> MutationOptions<A, R, E, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(
        self,
        callback: impl Fn(&R, &A, &MutationContext<'_, V>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_success: Some(Box::new(callback)),
            ..self
        }
    }

    pub fn on_error(
        self,
        callback: impl Fn(&E, &A, &MutationContext<'_, V>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_error: Some(Box::new(callback)),
            ..self
        }
    }

    pub fn on_settled(
        self,
        callback: impl Fn(Result<&R, &E>, &A, &MutationContext<'_, V>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_settled: Some(Box::new(callback)),
            ..self
        }
    }

    pub(crate) fn succeeded(&self, result: &R, variables: &A, context: &MutationContext<'_, V>) {
        if let Some(callback) = &self.on_success {
            callback(result, variables, context);
        }
        if let Some(callback) = &self.on_settled {
            callback(Ok(result), variables, context);
        }
    }

    pub(crate) fn failed(&self, error: &E, variables: &A, context: &MutationContext<'_, V>) {
        if let Some(callback) = &self.on_error {
            callback(error, variables, context);
        }
        if let Some(callback) = &self.on_settled {
            callback(Err(error), variables, context);
        }
    }
}

/// The execution context of a single mutation call, handed to the callbacks.
///
/// It gives the callbacks access to the cache of the client running the
/// mutation.
pub struct MutationContext<'a, V> {
    client: &'a BaseClient<V>,
    descriptor: &'a MutationDescriptor,
    invocation_id: u64,
}

impl<'a, V> MutationContext<'a, V> {
    pub(crate) fn new(
        client: &'a BaseClient<V>,
        descriptor: &'a MutationDescriptor,
        invocation_id: u64,
    ) -> Self {
        Self {
            client,
            descriptor,
            invocation_id,
        }
    }

    pub fn mutation_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &MutationDescriptor {
        self.descriptor
    }

    /// A number identifying this call among all mutation calls of the client.
    /// Ids increase in the order the calls started.
    pub fn invocation_id(&self) -> u64 {
        self.invocation_id
    }

    /// Marks every cached query starting with `prefix` as invalidated and returns
    /// the number of matched entries.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        self.client.invalidate_queries(prefix)
    }
}

impl<'a, V> MutationContext<'a, V>
where
    V: Clone,
{
    pub fn get_query(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.client.get_query(key)
    }

    pub fn get_query_data(&self, key: &QueryKey) -> Option<V> {
        self.client.get_query_data(key)
    }

    pub fn set_query_data(&self, key: QueryKey, data: V) {
        self.client.set_query_data(key, data);
    }
}

impl<'a, V> fmt::Debug for MutationContext<'a, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationContext")
            .field("mutation", &self.descriptor.name())
            .field("invocation_id", &self.invocation_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{MutationDescriptor, MutationOptions};
    use crate::query_key;

    #[test]
    fn descriptor_builders() {
        let descriptor = MutationDescriptor::new("uploadFile")
            .invalidates(query_key!["pets", "list"])
            .invalidates(query_key!["pets", "detail"]);
        let same = MutationDescriptor::with_targets(
            "uploadFile",
            [query_key!["pets", "list"], query_key!["pets", "detail"]],
        );

        assert_eq!(descriptor, same);
        assert_eq!(descriptor.targets().len(), 2);
        assert!(MutationDescriptor::new("noop").targets().is_empty());
    }

    #[test]
    fn options_register_callbacks() {
        let options: MutationOptions<(), (), (), ()> = MutationOptions::new();
        assert_eq!(
            format!("{options:?}"),
            "MutationOptions { on_success: false, on_error: false, on_settled: false }"
        );

        let options = options
            .on_success(|_, _, _| {})
            .on_settled(|_, _, _| {});
        assert_eq!(
            format!("{options:?}"),
            "MutationOptions { on_success: true, on_error: false, on_settled: true }"
        );
    }
}
