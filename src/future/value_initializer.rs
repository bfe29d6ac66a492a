use async_lock::{RwLock, RwLockWriteGuard};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
};
use triomphe::Arc as TrioArc;

use crate::common::{base_client::BaseClient, key::QueryKey, MAX_FETCH_RETRIES};

type ErrorObject = Arc<dyn Any + Send + Sync + 'static>;

pub(crate) enum FetchResult<V, E> {
    Fetched(V),
    ReadExisting(V),
    FetchErr(Arc<E>),
}

enum WaiterValue<V> {
    Computing,
    Ready(Result<V, ErrorObject>),
    FetchFuturePanicked,
    EnclosingFutureAborted,
}

type Waiter<V> = TrioArc<RwLock<WaiterValue<V>>>;
type WaiterKey = (QueryKey, TypeId);
type WaiterMap<V> = Mutex<HashMap<WaiterKey, Waiter<V>>>;

struct WaiterGuard<'a, V> {
    w_key: Option<WaiterKey>,
    waiters: &'a WaiterMap<V>,
    client: &'a BaseClient<V>,
    fetch_started: bool,
    write_lock: RwLockWriteGuard<'a, WaiterValue<V>>,
}

impl<'a, V> WaiterGuard<'a, V> {
    fn new(
        w_key: WaiterKey,
        waiters: &'a WaiterMap<V>,
        client: &'a BaseClient<V>,
        write_lock: RwLockWriteGuard<'a, WaiterValue<V>>,
    ) -> Self {
        Self {
            w_key: Some(w_key),
            waiters,
            client,
            fetch_started: false,
            write_lock,
        }
    }

    fn set_waiter_value(mut self, v: WaiterValue<V>) {
        *self.write_lock = v;
        if let Some(w_key) = self.w_key.take() {
            remove_waiter(self.waiters, &w_key);
        }
    }
}

impl<'a, V> Drop for WaiterGuard<'a, V> {
    fn drop(&mut self) {
        if let Some(w_key) = self.w_key.take() {
            // The value was never set, so the future calling `fetch` was dropped
            // while the fetch future was pending. Release the in-flight slot and
            // let the waiters retry with their own fetch futures.
            if self.fetch_started {
                self.client.abandon_fetch(&w_key.0);
            }
            *self.write_lock = WaiterValue::EnclosingFutureAborted;
            remove_waiter(self.waiters, &w_key);
        }
    }
}

/// De-duplicates concurrent fetches of the same query.
///
/// The first caller for a key becomes the leader and runs its fetch future.
/// Other callers wait for the leader's result instead of running theirs.
pub(crate) struct ValueInitializer<V> {
    // TypeId is the type ID of the concrete error type E of the fetch future. We
    // use it as a part of the key to ensure that we can always downcast the
    // ErrorObject in a Waiter<V> into its concrete type.
    waiters: TrioArc<WaiterMap<V>>,
}

impl<V> Default for ValueInitializer<V> {
    fn default() -> Self {
        Self {
            waiters: TrioArc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<V> ValueInitializer<V>
where
    V: Clone + Send + Sync + 'static,
{
    //
    // NOTES: We take `Pin<&mut impl Future>` instead of `impl Future` for the
    // `fetch` argument to avoid the future size inflation caused by calling
    // nested async functions.
    //

    /// Runs `fetch` unless another caller is already fetching `key`, in which
    /// case the other caller's result is returned. When `force` is `false`,
    /// fresh cached data is returned without running `fetch`.
    ///
    /// # Panics
    /// Panics if the `fetch` future has been panicked.
    pub(crate) async fn try_fetch_or_read<E>(
        &self,
        key: &QueryKey,
        client: &BaseClient<V>,
        force: bool,
        fetch: Pin<&mut impl Future<Output = Result<V, E>>>,
    ) -> FetchResult<V, E>
    where
        E: Send + Sync + 'static,
    {
        use std::panic::{resume_unwind, AssertUnwindSafe};
        use FetchResult::*;

        let mut retries = 0;
        let w_key = (key.clone(), TypeId::of::<E>());

        let waiter = TrioArc::new(RwLock::new(WaiterValue::Computing));
        // NOTE: We have to acquire a write lock before `try_insert_waiter`,
        // so that any concurrent attempt will get our lock and wait on it.
        let lock = waiter.write().await;

        loop {
            let Some(existing_waiter) = try_insert_waiter(&self.waiters, &w_key, &waiter) else {
                break;
            };

            // Somebody else is fetching the query. Wait for the result.
            let waiter_result = existing_waiter.read().await;
            match &*waiter_result {
                WaiterValue::Ready(Ok(value)) => {
                    client.record_hit();
                    return ReadExisting(value.clone());
                }
                WaiterValue::Ready(Err(e)) => {
                    return FetchErr(downcast_error(Arc::clone(e)));
                }
                WaiterValue::FetchFuturePanicked => {
                    retries += 1;
                    panic_if_retry_exhausted_for_panicking(retries);
                    continue;
                }
                WaiterValue::EnclosingFutureAborted => {
                    retries += 1;
                    panic_if_retry_exhausted_for_aborting(retries);
                    continue;
                }
                WaiterValue::Computing => {
                    unreachable!("a waiter was released while it was still computing")
                }
            }
        }

        // Our waiter was inserted. We are the leader.
        let mut waiter_guard = WaiterGuard::new(w_key, &self.waiters, client, lock);

        // Check if the query has been fetched by the previous leader.
        if !force {
            if let Some(value) = client.fresh_data(key) {
                client.record_hit();
                waiter_guard.set_waiter_value(WaiterValue::Ready(Ok(value.clone())));
                return ReadExisting(value);
            }
        }

        let in_flight = client.start_fetch(key);
        waiter_guard.fetch_started = true;

        // Catching panic is safe here as we do not poll the future again.
        match AssertUnwindSafe(fetch).catch_unwind().await {
            Ok(Ok(value)) => {
                client.finish_fetch(key, value.clone(), in_flight);
                waiter_guard.set_waiter_value(WaiterValue::Ready(Ok(value.clone())));
                Fetched(value)
            }
            Ok(Err(e)) => {
                client.fail_fetch(key, in_flight);
                let err: ErrorObject = Arc::new(e);
                waiter_guard.set_waiter_value(WaiterValue::Ready(Err(Arc::clone(&err))));
                FetchErr(downcast_error(err))
            }
            Err(payload) => {
                client.abandon_fetch(key);
                waiter_guard.set_waiter_value(WaiterValue::FetchFuturePanicked);
                resume_unwind(payload);
            }
        }
        // The lock will be unlocked here.
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

#[inline]
fn remove_waiter<V>(waiter_map: &WaiterMap<V>, w_key: &WaiterKey) {
    waiter_map.lock().remove(w_key);
}

/// Inserts `waiter` unless the key already has one, in which case the existing
/// waiter is returned.
#[inline]
fn try_insert_waiter<V>(
    waiter_map: &WaiterMap<V>,
    w_key: &WaiterKey,
    waiter: &Waiter<V>,
) -> Option<Waiter<V>> {
    let mut waiters = waiter_map.lock();
    if let Some(existing) = waiters.get(w_key) {
        return Some(TrioArc::clone(existing));
    }
    waiters.insert(w_key.clone(), TrioArc::clone(waiter));
    None
}

#[inline]
fn panic_if_retry_exhausted_for_panicking(retries: usize) {
    if retries >= MAX_FETCH_RETRIES {
        panic!(
            "Too many retries. Tried to read the result of another fetch future \
            {retries} times, but it kept panicking"
        );
    }
}

#[inline]
fn panic_if_retry_exhausted_for_aborting(retries: usize) {
    if retries >= MAX_FETCH_RETRIES {
        panic!(
            "Too many retries. Tried to read the result of another fetch future \
            {retries} times, but the futures calling `fetch` kept being dropped"
        );
    }
}
