#![cfg(all(test, feature = "future"))]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_lock::Barrier;
use parking_lot::Mutex;
use qcache::{
    future::QueryClient, mutation::MutationOptions, notification::QueryEvent, query_key,
    InvalidationMap, KeyPart, QueryKey, QueryStatus,
};
use tokio::sync::oneshot;

const NUM_TASKS: u8 = 16;

#[derive(Clone, Debug, PartialEq)]
struct Pet {
    id: i64,
    name: String,
}

fn pet(id: i64, name: &str) -> Pet {
    Pet {
        id,
        name: name.to_string(),
    }
}

#[derive(Debug)]
struct HttpError(u16);

fn pets_map() -> InvalidationMap {
    InvalidationMap::builder()
        .query("listPets", query_key!["pets", "list"])
        .query("showPetById", query_key!["pets", "detail"])
        .mutation("createPets", ["listPets"])
        .mutation("uploadFile", ["listPets", "showPetById"])
        .build()
}

fn pets_client() -> QueryClient<Vec<Pet>> {
    QueryClient::builder().invalidation_map(pets_map()).build()
}

fn list_key() -> QueryKey {
    query_key!["pets", "list", KeyPart::map([("limit", 10)])]
}

#[tokio::test]
async fn test_create_pets_invalidates_the_list() {
    let client = pets_client();

    client.set_query_data(list_key(), vec![pet(1, "Rex")]);
    assert_eq!(client.is_stale(&list_key()), Some(false));

    let create_pets = client.descriptor("createPets");
    let created = client
        .mutate(&create_pets, pet(2, "Bella"), |new_pet| async move {
            Ok::<_, HttpError>(new_pet.id)
        })
        .await
        .unwrap();
    assert_eq!(created, 2);

    let entry = client.get_query(&list_key()).unwrap();
    assert!(entry.is_invalidated());
    assert_eq!(entry.status(), QueryStatus::Success);
    assert_eq!(entry.data(), Some(&vec![pet(1, "Rex")]));
}

#[tokio::test]
async fn test_failed_mutation_leaves_cache_unchanged() {
    let client = pets_client();
    client.set_query_data(list_key(), vec![pet(1, "Rex")]);
    let before = client.get_query(&list_key()).unwrap();

    let create_pets = client.descriptor("createPets");
    let err = client
        .mutate(&create_pets, pet(2, "Bella"), |_| async {
            Err::<(), _>(HttpError(500))
        })
        .await
        .unwrap_err();
    assert_eq!(err.mutation(), "createPets");
    assert_eq!(err.inner().0, 500);

    let after = client.get_query(&list_key()).unwrap();
    assert!(!after.is_invalidated());
    assert_eq!(after.data(), before.data());
    assert_eq!(after.data_updated_at(), before.data_updated_at());
    assert_eq!(client.stats().invalidated_entry_count(), 0);
}

#[tokio::test]
async fn test_invalidation_does_not_create_entries() {
    let client = pets_client();

    let upload_file = client.descriptor("uploadFile");
    client
        .mutate(&upload_file, "rex.png", |_| async { Ok::<_, HttpError>(()) })
        .await
        .unwrap();

    assert_eq!(client.entry_count(), 0);
    assert_eq!(client.invalidate_queries(&query_key!["pets"]), 0);
    assert!(client.query_keys().is_empty());
}

#[tokio::test]
async fn test_on_success_sees_every_target_invalidated() {
    let client = pets_client();
    let detail = query_key!["pets", "detail", 1];
    client.set_query_data(list_key(), vec![pet(1, "Rex")]);
    client.set_query_data(detail.clone(), vec![pet(1, "Rex")]);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let my_observed = Arc::clone(&observed);
    let keys = vec![list_key(), detail];
    let options = MutationOptions::new().on_success(move |_: &(), _: &&str, ctx| {
        for key in &keys {
            let entry = ctx.get_query(key).unwrap();
            my_observed.lock().push(entry.is_invalidated());
        }
    });

    let upload_file = client.descriptor("uploadFile");
    client
        .mutate_with_options(&upload_file, &options, "rex.png", |_| async {
            Ok::<_, HttpError>(())
        })
        .await
        .unwrap();

    assert_eq!(*observed.lock(), vec![true, true]);
}

#[tokio::test]
async fn test_concurrent_fetches_run_once() {
    let client: QueryClient<Vec<Pet>> = QueryClient::new();
    let call_counter = Arc::new(AtomicUsize::default());
    let barrier = Arc::new(Barrier::new(NUM_TASKS as usize));

    let tasks: Vec<_> = (0..NUM_TASKS)
        .map(|task_id| {
            let my_client = client.clone();
            let my_call_counter = Arc::clone(&call_counter);
            let my_barrier = Arc::clone(&barrier);

            tokio::spawn(async move {
                my_barrier.wait().await;

                let key = list_key();
                let fetch = async move {
                    println!("Task {task_id} fetching the list.");
                    my_call_counter.fetch_add(1, Ordering::AcqRel);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, HttpError>(vec![pet(1, "Rex")])
                };

                let pets = if task_id % 2 == 0 {
                    my_client.fetch(&key, fetch).await.unwrap()
                } else {
                    my_client.prefetch(&key, fetch).await.unwrap();
                    my_client.get_query_data(&key).unwrap()
                };
                assert_eq!(pets, vec![pet(1, "Rex")]);
            })
        })
        .collect();

    futures_util::future::join_all(tasks).await;

    assert_eq!(call_counter.load(Ordering::Acquire), 1);
    let stats = client.stats();
    assert_eq!(stats.miss_count(), 1);
    assert_eq!(stats.hit_count(), NUM_TASKS as u64 - 1);
    assert_eq!(stats.fetch_success_count(), 1);
}

#[tokio::test]
async fn test_concurrent_fetch_errors_are_shared() {
    let client: QueryClient<Vec<Pet>> = QueryClient::new();
    let call_counter = Arc::new(AtomicUsize::default());
    let barrier = Arc::new(Barrier::new(NUM_TASKS as usize));

    let tasks: Vec<_> = (0..NUM_TASKS)
        .map(|_| {
            let my_client = client.clone();
            let my_call_counter = Arc::clone(&call_counter);
            let my_barrier = Arc::clone(&barrier);

            tokio::spawn(async move {
                my_barrier.wait().await;
                my_client
                    .fetch(&list_key(), async move {
                        my_call_counter.fetch_add(1, Ordering::AcqRel);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err::<Vec<Pet>, _>(HttpError(503))
                    })
                    .await
            })
        })
        .collect();

    let results = futures_util::future::join_all(tasks).await;
    let calls = call_counter.load(Ordering::Acquire);
    // Errors are not cached, so a task that starts after the failure fetches again.
    assert!(calls >= 1);
    for result in results {
        let err = result.unwrap().unwrap_err();
        assert_eq!(err.inner().0, 503);
        assert_eq!(err.key(), &list_key());
    }
    assert!(!client.contains_query(&list_key()));
    let stats = client.stats();
    assert_eq!(stats.fetch_failure_count(), calls as u64);
    assert_eq!(stats.miss_count(), calls as u64);
    // A shared error is not a cache hit.
    assert_eq!(stats.hit_count(), 0);
}

#[tokio::test]
async fn test_failed_refetch_keeps_stale_data() {
    let client = pets_client();
    client.set_query_data(list_key(), vec![pet(1, "Rex")]);
    client.invalidate_queries(&query_key!["pets", "list"]);

    let err = client
        .fetch(&list_key(), async { Err::<Vec<Pet>, _>(HttpError(502)) })
        .await
        .unwrap_err();
    assert_eq!(err.inner().0, 502);

    let entry = client.get_query(&list_key()).unwrap();
    assert_eq!(entry.status(), QueryStatus::Error);
    assert_eq!(entry.data(), Some(&vec![pet(1, "Rex")]));
    assert!(entry.is_invalidated());
    assert!(!entry.is_fetching());
    assert_eq!(entry.fetch_failure_count(), 1);

    // The next successful fetch clears the error and the invalidation.
    let pets = client
        .fetch(&list_key(), async {
            Ok::<_, HttpError>(vec![pet(1, "Rex"), pet(2, "Bella")])
        })
        .await
        .unwrap();
    assert_eq!(pets.len(), 2);
    let entry = client.get_query(&list_key()).unwrap();
    assert_eq!(entry.status(), QueryStatus::Success);
    assert!(!entry.is_invalidated());
    assert_eq!(entry.fetch_failure_count(), 0);
}

#[tokio::test]
async fn test_fetch_started_before_mutation_keeps_invalidation() {
    let client = pets_client();
    client.set_query_data(list_key(), vec![pet(1, "Rex")]);
    client.invalidate_queries(&query_key!["pets"]);

    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let fetch = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .fetch(&list_key(), async move {
                    // The server state is read before the mutation lands.
                    let pets = vec![pet(1, "Rex")];
                    started_tx.send(()).unwrap();
                    release_rx.await.unwrap();
                    Ok::<_, HttpError>(pets)
                })
                .await
        })
    };

    started_rx.await.unwrap();
    assert!(client.get_query(&list_key()).unwrap().is_fetching());

    client
        .mutate(&client.descriptor("createPets"), pet(2, "Bella"), |_| async {
            Ok::<_, HttpError>(())
        })
        .await
        .unwrap();
    release_tx.send(()).unwrap();
    assert_eq!(fetch.await.unwrap().unwrap(), vec![pet(1, "Rex")]);

    let entry = client.get_query(&list_key()).unwrap();
    assert!(entry.is_invalidated());
    assert!(!entry.is_fetching());
    assert_eq!(entry.data(), Some(&vec![pet(1, "Rex")]));
    assert_eq!(client.is_stale(&list_key()), Some(true));

    // The next read fetches the post-mutation list.
    let call_counter = AtomicUsize::default();
    let pets = client
        .fetch(&list_key(), async {
            call_counter.fetch_add(1, Ordering::AcqRel);
            Ok::<_, HttpError>(vec![pet(1, "Rex"), pet(2, "Bella")])
        })
        .await
        .unwrap();
    assert_eq!(pets, vec![pet(1, "Rex"), pet(2, "Bella")]);
    assert_eq!(call_counter.load(Ordering::Acquire), 1);
    assert!(!client.get_query(&list_key()).unwrap().is_invalidated());
}

#[tokio::test]
async fn test_dropped_leader_lets_waiter_fetch() {
    let client: QueryClient<Vec<Pet>> = QueryClient::new();
    let started = Arc::new(Barrier::new(2));

    let leader = {
        let client = client.clone();
        let started = Arc::clone(&started);
        tokio::spawn(async move {
            client
                .fetch(&list_key(), async move {
                    started.wait().await;
                    futures_util::future::pending::<Result<Vec<Pet>, HttpError>>().await
                })
                .await
        })
    };

    // Wait until the leader's fetch future is running.
    started.wait().await;
    assert!(client.get_query(&list_key()).unwrap().is_fetching());

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .fetch(&list_key(), async { Ok::<_, HttpError>(vec![pet(3, "Max")]) })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    leader.abort();
    assert!(leader.await.unwrap_err().is_cancelled());

    let pets = waiter.await.unwrap().unwrap();
    assert_eq!(pets, vec![pet(3, "Max")]);
    assert_eq!(client.get_query_data(&list_key()), Some(vec![pet(3, "Max")]));
}

#[tokio::test]
async fn test_event_listener() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let my_events = Arc::clone(&events);
    let client: QueryClient<Vec<Pet>> = QueryClient::builder()
        .invalidation_map(pets_map())
        .event_listener(move |key: &QueryKey, event| {
            my_events.lock().push((key.to_string(), event));
        })
        .build();

    client
        .fetch(&list_key(), async { Ok::<_, HttpError>(vec![pet(1, "Rex")]) })
        .await
        .unwrap();
    client
        .mutate(&client.descriptor("createPets"), (), |_| async {
            Ok::<_, HttpError>(())
        })
        .await
        .unwrap();
    client
        .fetch(&list_key(), async { Err::<Vec<Pet>, _>(HttpError(500)) })
        .await
        .unwrap_err();
    client.clear();

    let key = r#"["pets","list",{"limit":10}]"#.to_string();
    assert_eq!(
        *events.lock(),
        vec![
            (key.clone(), QueryEvent::FetchStarted),
            (key.clone(), QueryEvent::Updated),
            (key.clone(), QueryEvent::Invalidated),
            (key.clone(), QueryEvent::FetchStarted),
            (key.clone(), QueryEvent::FetchFailed),
            (key, QueryEvent::Removed),
        ]
    );
}

#[tokio::test]
async fn test_panicking_event_listener_is_disabled() {
    let call_counter = Arc::new(AtomicUsize::default());
    let my_call_counter = Arc::clone(&call_counter);
    let client: QueryClient<u32> = QueryClient::builder()
        .event_listener(move |_: &QueryKey, _| {
            my_call_counter.fetch_add(1, Ordering::AcqRel);
            panic!("listener failed");
        })
        .build();

    client.set_query_data(query_key!["a"], 1);
    client.set_query_data(query_key!["b"], 2);
    client.invalidate_all();

    assert_eq!(call_counter.load(Ordering::Acquire), 1);
    assert_eq!(client.get_query_data(&query_key!["b"]), Some(2));
}

#[tokio::test]
async fn test_stale_time() {
    let (clock, mock) = quanta::Clock::mock();
    let client: QueryClient<Vec<Pet>> = QueryClient::builder()
        .stale_time(Duration::from_secs(60))
        .clock(clock)
        .build();
    let call_counter = Arc::new(AtomicUsize::default());

    let fetch = |counter: Arc<AtomicUsize>| async move {
        counter.fetch_add(1, Ordering::AcqRel);
        Ok::<_, HttpError>(vec![pet(1, "Rex")])
    };

    client
        .fetch(&list_key(), fetch(Arc::clone(&call_counter)))
        .await
        .unwrap();
    mock.increment(Duration::from_secs(59));
    client
        .fetch(&list_key(), fetch(Arc::clone(&call_counter)))
        .await
        .unwrap();
    assert_eq!(call_counter.load(Ordering::Acquire), 1);

    mock.increment(Duration::from_secs(1));
    assert_eq!(client.is_stale(&list_key()), Some(true));
    // Stale data is still readable without fetching.
    assert!(client.get_query_data(&list_key()).is_some());

    client
        .fetch(&list_key(), fetch(Arc::clone(&call_counter)))
        .await
        .unwrap();
    assert_eq!(call_counter.load(Ordering::Acquire), 2);
    assert_eq!(client.is_stale(&list_key()), Some(false));
}
