#![cfg(all(test, feature = "sync"))]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use qcache::{
    mutation::{MutationDescriptor, MutationOptions},
    query_key,
    sync::QueryClient,
    ConfigurationError, InvalidationMap, KeyPart, QueryKey, QueryStatus,
};

const NUM_THREADS: u8 = 16;

#[derive(Clone, Debug, PartialEq)]
struct Pet {
    id: i64,
    name: &'static str,
}

const REX: Pet = Pet { id: 1, name: "Rex" };
const BELLA: Pet = Pet {
    id: 2,
    name: "Bella",
};

fn list_key() -> QueryKey {
    query_key!["pets", "list", KeyPart::map([("limit", 10)])]
}

#[test]
fn test_mutation_invalidates_declared_prefixes_only() {
    let map = InvalidationMap::builder()
        .query("listPets", query_key!["pets", "list"])
        .query("listOwners", query_key!["owners", "list"])
        .mutation("createPets", ["listPets"])
        .build();
    let client: QueryClient<Vec<Pet>> = QueryClient::builder().invalidation_map(map).build();

    let owners = query_key!["owners", "list"];
    let detail = query_key!["pets", "detail", 1];
    client.set_query_data(list_key(), vec![REX]);
    client.set_query_data(query_key!["pets", "list", 2], vec![]);
    client.set_query_data(owners.clone(), vec![]);
    client.set_query_data(detail.clone(), vec![REX]);

    client
        .mutate(&client.descriptor("createPets"), BELLA, |_| Ok::<_, ()>(()))
        .unwrap();

    assert_eq!(client.is_stale(&list_key()), Some(true));
    assert_eq!(client.is_stale(&query_key!["pets", "list", 2]), Some(true));
    assert_eq!(client.is_stale(&owners), Some(false));
    assert_eq!(client.is_stale(&detail), Some(false));
    assert_eq!(client.stats().invalidated_entry_count(), 2);
}

#[test]
fn test_invalidation_is_idempotent() {
    let client: QueryClient<Vec<Pet>> = QueryClient::new();
    client.set_query_data(list_key(), vec![REX]);

    let descriptor = MutationDescriptor::new("createPets").invalidates(query_key!["pets"]);
    client.mutate(&descriptor, (), |_| Ok::<_, ()>(())).unwrap();
    let once = client.get_query(&list_key()).unwrap();
    client.mutate(&descriptor, (), |_| Ok::<_, ()>(())).unwrap();
    let twice = client.get_query(&list_key()).unwrap();

    assert!(once.is_invalidated());
    assert_eq!(once.is_invalidated(), twice.is_invalidated());
    assert_eq!(once.status(), twice.status());
    assert_eq!(once.data(), twice.data());
    assert_eq!(once.data_updated_at(), twice.data_updated_at());
    assert_eq!(client.stats().invalidated_entry_count(), 1);
}

#[test]
fn test_fetch_after_invalidation() {
    let client: QueryClient<Vec<Pet>> = QueryClient::new();
    let call_counter = AtomicUsize::default();
    let fetch = || {
        call_counter.fetch_add(1, Ordering::AcqRel);
        Ok::<_, ()>(vec![REX, BELLA])
    };

    client.set_query_data(list_key(), vec![REX]);
    assert_eq!(client.fetch(&list_key(), fetch).unwrap(), vec![REX]);
    assert_eq!(call_counter.load(Ordering::Acquire), 0);

    client.invalidate_queries(&query_key!["pets"]);
    assert_eq!(client.fetch(&list_key(), fetch).unwrap(), vec![REX, BELLA]);
    assert_eq!(call_counter.load(Ordering::Acquire), 1);
    assert!(!client.get_query(&list_key()).unwrap().is_invalidated());
}

#[test]
fn test_concurrent_fetches_run_once() {
    let client: QueryClient<Vec<Pet>> = QueryClient::new();
    let call_counter = Arc::new(AtomicUsize::default());
    let barrier = Arc::new(Barrier::new(NUM_THREADS as usize));

    let threads: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let my_client = client.clone();
            let my_call_counter = Arc::clone(&call_counter);
            let my_barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                my_barrier.wait();

                let pets = my_client
                    .fetch(&list_key(), || {
                        println!("Thread {thread_id} fetching the list.");
                        my_call_counter.fetch_add(1, Ordering::AcqRel);
                        thread::sleep(Duration::from_millis(100));
                        Ok::<_, ()>(vec![REX])
                    })
                    .unwrap();
                assert_eq!(pets, vec![REX]);
            })
        })
        .collect();

    threads.into_iter().for_each(|t| t.join().expect("Failed"));

    assert_eq!(call_counter.load(Ordering::Acquire), 1);
    assert_eq!(client.stats().miss_count(), 1);
}

#[test]
fn test_fetch_errors_with_different_types_do_not_share_results() {
    let client: QueryClient<u32> = QueryClient::new();
    let key = query_key!["pets", "count"];

    let err = client.fetch(&key, || Err("not found")).unwrap_err();
    assert_eq!(**err.inner(), "not found");

    let err = client.fetch(&key, || Err(std::fmt::Error)).unwrap_err();
    assert_eq!(*err.into_inner(), std::fmt::Error);

    assert!(!client.contains_query(&key));
    assert_eq!(client.stats().fetch_failure_count(), 2);
}

#[test]
fn test_failed_mutation_runs_on_error_then_on_settled() {
    let client: QueryClient<Vec<Pet>> = QueryClient::new();
    client.set_query_data(list_key(), vec![REX]);

    let calls = Arc::new(Mutex::new(Vec::new()));
    let (c1, c2, c3) = (Arc::clone(&calls), Arc::clone(&calls), Arc::clone(&calls));
    let options = MutationOptions::new()
        .on_success(move |_: &(), _: &Pet, _| c1.lock().push("on_success"))
        .on_error(move |_: &&str, _, _| c2.lock().push("on_error"))
        .on_settled(move |_, _, _| c3.lock().push("on_settled"));

    let descriptor = MutationDescriptor::new("createPets").invalidates(query_key!["pets"]);
    let err = client
        .mutate_with_options(&descriptor, &options, BELLA, |_| Err("409 conflict"))
        .unwrap_err();

    assert_eq!(err.to_string(), "mutation `createPets` failed: 409 conflict");
    assert_eq!(*calls.lock(), vec!["on_error", "on_settled"]);
    let entry = client.get_query(&list_key()).unwrap();
    assert!(!entry.is_invalidated());
    assert_eq!(entry.status(), QueryStatus::Success);
    assert_eq!(client.stats().mutation_failure_count(), 1);
}

#[test]
fn test_panicking_fetch_lets_waiter_retry() {
    let client: QueryClient<u32> = QueryClient::new();
    let key = query_key!["pets", "count"];
    let barrier = Arc::new(Barrier::new(2));

    let leader = {
        let (client, key, barrier) = (client.clone(), key.clone(), Arc::clone(&barrier));
        thread::spawn(move || {
            client.fetch(&key, || -> Result<u32, ()> {
                barrier.wait();
                thread::sleep(Duration::from_millis(100));
                panic!("connection lost");
            })
        })
    };

    // Wait until the leader is running its closure.
    barrier.wait();
    let value = client.fetch(&key, || Ok::<_, ()>(7));

    assert!(leader.join().is_err());
    assert_eq!(value.ok(), Some(7));
    assert_eq!(client.get_query_data(&key), Some(7));
}

#[test]
fn test_shared_fetch_error_is_not_a_hit() {
    let client: QueryClient<u32> = QueryClient::new();
    let key = query_key!["pets", "count"];
    let barrier = Arc::new(Barrier::new(2));

    let leader = {
        let (client, key, barrier) = (client.clone(), key.clone(), Arc::clone(&barrier));
        thread::spawn(move || {
            client.fetch(&key, || {
                barrier.wait();
                thread::sleep(Duration::from_millis(100));
                Err("503 service unavailable")
            })
        })
    };

    // Wait until the leader is running its closure.
    barrier.wait();
    let err = client
        .fetch(&key, || -> Result<u32, &'static str> { unreachable!() })
        .unwrap_err();

    assert_eq!(**err.inner(), "503 service unavailable");
    assert!(leader.join().unwrap().is_err());
    let stats = client.stats();
    assert_eq!(stats.miss_count(), 1);
    assert_eq!(stats.hit_count(), 0);
    assert_eq!(stats.fetch_failure_count(), 1);
}

#[test]
fn test_stale_time() {
    let (clock, mock) = quanta::Clock::mock();
    let client: QueryClient<u32> = QueryClient::builder()
        .stale_time(Duration::from_secs(10))
        .clock(clock)
        .build();
    let key = query_key!["pets", "count"];

    client.prefetch(&key, || Ok::<_, ()>(1)).unwrap();
    mock.increment(Duration::from_secs(5));
    assert_eq!(client.fetch(&key, || Ok::<_, ()>(2)).unwrap(), 1);

    mock.increment(Duration::from_secs(5));
    assert_eq!(client.fetch(&key, || Ok::<_, ()>(3)).unwrap(), 3);
    assert_eq!(client.is_stale(&key), Some(false));
    assert_eq!(client.stats().fetch_success_count(), 2);
}

#[test]
fn test_strict_invalidation_map() {
    let result = InvalidationMap::builder()
        .query("listPets", query_key!["pets", "list"])
        .mutation("createPets", ["listPets", "listOwners"])
        .try_build();

    assert_eq!(
        result.unwrap_err(),
        ConfigurationError::UnknownQuery {
            mutation: "createPets".to_string(),
            query: "listOwners".to_string(),
        }
    );

    // The lenient build keeps the valid targets.
    let map = InvalidationMap::builder()
        .query("listPets", query_key!["pets", "list"])
        .mutation("createPets", ["listPets", "listOwners"])
        .build();
    assert_eq!(map.targets("createPets"), &[query_key!["pets", "list"]]);
    assert_eq!(map.issues().len(), 1);
}
