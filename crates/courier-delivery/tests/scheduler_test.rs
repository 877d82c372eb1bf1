use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use courier_core::{Clock, EntryId, RequestStore};
use courier_delivery::{
    engine::{EngineStats, StorageErrorPolicy},
    handoff::{self, HandoffReceiver, HandoffSender},
    scheduler::{EnqueueSignal, Scheduler, SchedulerConfig},
    DeliveryError,
};
use courier_testing::{wait_until, EntryBuilder, FaultyStore, StoreOp, TestEnv};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

const HOUR: i64 = 3_600 * 1_000_000_000;

fn build_scheduler(
    env: &TestEnv,
    store: Arc<dyn RequestStore>,
    sender: HandoffSender,
    policy: StorageErrorPolicy,
    token: &CancellationToken,
) -> Scheduler {
    Scheduler::new(
        store,
        sender,
        SchedulerConfig {
            batch_size: 10,
            idle_interval: Duration::from_secs(1),
            storage_error_policy: policy,
        },
        env.clock_handle(),
        Arc::new(RwLock::new(EngineStats::default())),
        token.clone(),
        EnqueueSignal::new(),
    )
}

/// Collects every entry id handed off until `token` is cancelled.
fn collect(receiver: HandoffReceiver, token: &CancellationToken) -> Arc<Mutex<Vec<EntryId>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let token = token.clone();
    tokio::spawn(async move {
        while let Some(entry) = receiver.recv(&token).await {
            sink.lock().unwrap().push(entry.id);
        }
    });
    received
}

#[tokio::test]
async fn future_entry_is_not_dispatched() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    let entry = EntryBuilder::new().id(1).delivery_time(env.clock.now_nanos() + HOUR).build();
    env.insert(&entry).unwrap();

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    assert_eq!(scheduler.run_pass().await.unwrap(), 0);

    let stored = env.find_entry(EntryId(1)).unwrap().unwrap();
    assert!(!stored.scheduled);
    assert!(received.lock().unwrap().is_empty());
    token.cancel();
}

#[tokio::test]
async fn entry_dispatched_once_due() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    let due_at = env.clock.now_nanos() + 5_000_000_000;
    env.insert(&EntryBuilder::new().id(1).delivery_time(due_at).build()).unwrap();

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    assert_eq!(scheduler.run_pass().await.unwrap(), 0);

    env.clock.advance(Duration::from_secs(5));
    assert_eq!(scheduler.run_pass().await.unwrap(), 1);

    assert_eq!(*received.lock().unwrap(), vec![EntryId(1)]);
    assert!(env.find_entry(EntryId(1)).unwrap().unwrap().scheduled);
    token.cancel();
}

#[tokio::test]
async fn claimed_entry_is_never_dispatched_twice() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    env.insert(&EntryBuilder::new().id(1).delivery_time(0).build()).unwrap();

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    assert_eq!(scheduler.run_pass().await.unwrap(), 1);
    assert_eq!(scheduler.run_pass().await.unwrap(), 0);
    assert_eq!(scheduler.run_pass().await.unwrap(), 0);

    assert_eq!(received.lock().unwrap().len(), 1);
    token.cancel();
}

#[tokio::test]
async fn claimed_entry_is_skipped_and_pass_continues() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    env.insert(&EntryBuilder::new().id(1).delivery_time(0).scheduled().build()).unwrap();
    env.insert(&EntryBuilder::new().id(2).delivery_time(1).build()).unwrap();

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    assert_eq!(scheduler.run_pass().await.unwrap(), 1);

    assert_eq!(*received.lock().unwrap(), vec![EntryId(2)]);
    assert!(env.find_entry(EntryId(1)).unwrap().unwrap().scheduled);
    assert!(env.find_entry(EntryId(2)).unwrap().unwrap().scheduled);
    token.cancel();
}

#[tokio::test]
async fn full_batch_of_stuck_claims_stalls_the_pass() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    // build_scheduler reads batches of 10.
    for id in 0..10 {
        env.insert(&EntryBuilder::new().id(id).delivery_time(0).scheduled().build()).unwrap();
    }
    env.insert(&EntryBuilder::new().id(99).delivery_time(1).build()).unwrap();

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    assert_eq!(scheduler.run_pass().await.unwrap(), 0);
    assert!(received.lock().unwrap().is_empty());

    assert_eq!(courier_delivery::scheduler::release_claims(env.store()).unwrap(), 10);
    assert!(scheduler.run_pass().await.unwrap() > 0);
    token.cancel();
}

#[tokio::test]
async fn identical_times_dispatch_lower_id_first() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    env.insert(&EntryBuilder::new().id(20).delivery_time(100).build()).unwrap();
    env.insert(&EntryBuilder::new().id(10).delivery_time(100).build()).unwrap();

    assert_eq!(env.store().next(1).unwrap()[0].id, EntryId(10));

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    assert_eq!(scheduler.run_pass().await.unwrap(), 2);
    assert_eq!(*received.lock().unwrap(), vec![EntryId(10), EntryId(20)]);
    token.cancel();
}

#[tokio::test]
async fn pass_stops_at_first_entry_not_yet_due() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    let now = env.clock.now_nanos();
    env.insert(&EntryBuilder::new().id(1).delivery_time(now - 1).build()).unwrap();
    env.insert(&EntryBuilder::new().id(2).delivery_time(now + HOUR).build()).unwrap();

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    assert_eq!(scheduler.run_pass().await.unwrap(), 1);
    assert_eq!(*received.lock().unwrap(), vec![EntryId(1)]);
    assert!(!env.find_entry(EntryId(2)).unwrap().unwrap().scheduled);
    token.cancel();
}

#[tokio::test]
async fn failed_claim_is_not_dispatched() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    env.insert(&EntryBuilder::new().id(1).delivery_time(0).build()).unwrap();
    let store = Arc::new(FaultyStore::new(env.store_handle()));
    store.fail_times(StoreOp::Put, 1);

    let scheduler = build_scheduler(&env, store.clone(), tx, StorageErrorPolicy::Continue, &token);
    let error = scheduler.run_pass().await.unwrap_err();
    assert!(matches!(error, DeliveryError::StorageFailure { .. }));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(received.lock().unwrap().is_empty());
    assert!(!env.find_entry(EntryId(1)).unwrap().unwrap().scheduled);
    token.cancel();
}

#[tokio::test]
async fn interrupted_handoff_releases_claim() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    // Receiver kept alive but never polled, so the hand-off cannot complete.
    let (tx, _rx) = handoff::channel();

    env.insert(&EntryBuilder::new().id(1).delivery_time(0).build()).unwrap();

    let scheduler =
        build_scheduler(&env, env.store_handle(), tx, StorageErrorPolicy::Continue, &token);
    let pass = tokio::spawn(async move { scheduler.run_pass().await });

    let store = env.store_handle();
    wait_until(Duration::from_secs(2), || {
        store.next(1).map(|batch| batch.first().is_some_and(|e| e.scheduled)).unwrap_or(false)
    })
    .await
    .unwrap();

    token.cancel();
    assert_eq!(pass.await.unwrap().unwrap(), 0);
    assert!(!env.find_entry(EntryId(1)).unwrap().unwrap().scheduled);
}

#[tokio::test(flavor = "multi_thread")]
async fn halt_policy_stops_on_storage_failure() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, _rx) = handoff::channel();

    let store = Arc::new(FaultyStore::new(env.store_handle()));
    store.fail_always(StoreOp::Next);

    let scheduler = build_scheduler(&env, store, tx, StorageErrorPolicy::Halt, &token);
    let result = tokio::time::timeout(Duration::from_secs(5), scheduler.run()).await.unwrap();

    assert!(matches!(result, Err(DeliveryError::StorageFailure { .. })));
    assert!(token.is_cancelled());
}

#[tokio::test(flavor = "multi_thread")]
async fn continue_policy_survives_storage_failures() {
    let env = TestEnv::new().await.unwrap();
    let token = CancellationToken::new();
    let (tx, rx) = handoff::channel();
    let received = collect(rx, &token);

    env.insert(&EntryBuilder::new().id(1).delivery_time(0).build()).unwrap();
    let store = Arc::new(FaultyStore::new(env.store_handle()));
    store.fail_times(StoreOp::Next, 2);

    let scheduler = build_scheduler(&env, store.clone(), tx, StorageErrorPolicy::Continue, &token);
    let run = tokio::spawn(scheduler.run());

    let seen = received.clone();
    wait_until(Duration::from_secs(5), move || !seen.lock().unwrap().is_empty()).await.unwrap();

    token.cancel();
    run.await.unwrap().unwrap();
    assert_eq!(store.failure_count(StoreOp::Next), 2);
    assert_eq!(*received.lock().unwrap(), vec![EntryId(1)]);
}
