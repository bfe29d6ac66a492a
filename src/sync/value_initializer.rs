use parking_lot::{Mutex, RwLock};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use triomphe::Arc as TrioArc;

use crate::common::{base_client::BaseClient, key::QueryKey, MAX_FETCH_RETRIES};

type ErrorObject = Arc<dyn Any + Send + Sync + 'static>;
type WaiterValue<V> = Option<Result<V, ErrorObject>>;
type Waiter<V> = TrioArc<RwLock<WaiterValue<V>>>;
type WaiterKey = (QueryKey, TypeId);

pub(crate) enum FetchResult<V, E> {
    Fetched(V),
    ReadExisting(V),
    FetchErr(Arc<E>),
}

pub(crate) struct ValueInitializer<V> {
    // TypeId is the type ID of the concrete error type E of the fetch closure. We
    // use it as a part of the key to ensure that we can always downcast the
    // ErrorObject in a Waiter<V> into its concrete type.
    waiters: Mutex<HashMap<WaiterKey, Waiter<V>>>,
}

impl<V> Default for ValueInitializer<V> {
    fn default() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> ValueInitializer<V>
where
    V: Clone,
{
    /// Runs `fetch` unless another thread is already fetching `key`, in which
    /// case this thread blocks until the other thread's result is available.
    /// When `force` is `false`, fresh cached data is returned without running
    /// `fetch`.
    ///
    /// # Panics
    /// Panics if the `fetch` closure has been panicked.
    pub(crate) fn try_fetch_or_read<E>(
        &self,
        key: &QueryKey,
        client: &BaseClient<V>,
        force: bool,
        fetch: impl FnOnce() -> Result<V, E>,
    ) -> FetchResult<V, E>
    where
        E: Send + Sync + 'static,
    {
        use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
        use FetchResult::*;

        let mut retries = 0;
        let w_key = (key.clone(), TypeId::of::<E>());

        loop {
            let waiter = TrioArc::new(RwLock::new(None));
            let mut lock = waiter.write();

            match self.try_insert_waiter(&w_key, &waiter) {
                None => {
                    // Our waiter was inserted.
                    // Check if the query has been fetched by the previous leader.
                    if !force {
                        if let Some(value) = client.fresh_data(key) {
                            client.record_hit();
                            *lock = Some(Ok(value.clone()));
                            self.remove_waiter(&w_key);
                            return ReadExisting(value);
                        }
                    }

                    let in_flight = client.start_fetch(key);

                    // Catching panic is safe here as we do not try to evaluate the
                    // closure again.
                    match catch_unwind(AssertUnwindSafe(fetch)) {
                        Ok(Ok(value)) => {
                            client.finish_fetch(key, value.clone(), in_flight);
                            *lock = Some(Ok(value.clone()));
                            self.remove_waiter(&w_key);
                            return Fetched(value);
                        }
                        Ok(Err(e)) => {
                            client.fail_fetch(key, in_flight);
                            let err: ErrorObject = Arc::new(e);
                            *lock = Some(Err(Arc::clone(&err)));
                            self.remove_waiter(&w_key);
                            return FetchErr(downcast_error(err));
                        }
                        Err(payload) => {
                            client.abandon_fetch(key);
                            *lock = None;
                            self.remove_waiter(&w_key);
                            resume_unwind(payload);
                        }
                    }
                    // The write lock will be unlocked here.
                }
                Some(existing_waiter) => {
                    // Somebody else's waiter already exists. Drop our write lock and
                    // wait for the read lock to become available.
                    std::mem::drop(lock);
                    match &*existing_waiter.read() {
                        Some(Ok(value)) => {
                            client.record_hit();
                            return ReadExisting(value.clone());
                        }
                        Some(Err(e)) => {
                            return FetchErr(downcast_error(Arc::clone(e)));
                        }
                        // None means somebody else's fetch closure has been panicked.
                        None => {
                            retries += 1;
                            if retries < MAX_FETCH_RETRIES {
                                // Retry from the beginning.
                                continue;
                            } else {
                                panic!(
                                    "Too many retries. Tried to read the result of \
                                    another fetch closure {retries} times, but it kept \
                                    panicking"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    #[inline]
    fn remove_waiter(&self, w_key: &WaiterKey) {
        self.waiters.lock().remove(w_key);
    }

    #[inline]
    fn try_insert_waiter(&self, w_key: &WaiterKey, waiter: &Waiter<V>) -> Option<Waiter<V>> {
        let mut waiters = self.waiters.lock();
        if let Some(existing) = waiters.get(w_key) {
            return Some(TrioArc::clone(existing));
        }
        waiters.insert(w_key.clone(), TrioArc::clone(waiter));
        None
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

fn downcast_error<E>(err: ErrorObject) -> Arc<E>
where
    E: Send + Sync + 'static,
{
    match err.downcast::<E>() {
        Ok(e) => e,
        // The waiter key carries the type ID of E.
        Err(_) => unreachable!("the error type of a waiter does not match its key"),
    }
}
