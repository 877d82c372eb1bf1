//! Integration tests for the durable request store.
//!
//! Exercises the on-disk redb backend: durability across reopen, atomic
//! reschedule, and the ingress enqueue contract.

use std::time::{Duration, UNIX_EPOCH};

use courier_core::{enqueue, EntryId, QueueEntry, RedbRequestStore, RequestStore, TestClock};

#[test]
fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("requests.db");

    let entry = QueueEntry::new(EntryId(7), 1_000, "POST", "/orders?id=3", 3);
    {
        let store = RedbRequestStore::open(&path).unwrap();
        store.put(&entry).unwrap();
        store.put(&entry.claimed()).unwrap();
    }

    let store = RedbRequestStore::open(&path).unwrap();
    let stored = store.next(10).unwrap();
    assert_eq!(stored, vec![entry.claimed()]);
}

#[test]
fn reschedule_leaves_exactly_one_record_per_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbRequestStore::open(dir.path().join("requests.db")).unwrap();

    let first = QueueEntry::new(EntryId(1), 100, "GET", "/x", 3).claimed();
    let bystander = QueueEntry::new(EntryId(2), 150, "GET", "/y", 3);
    store.put(&first).unwrap();
    store.put(&bystander).unwrap();

    let second = QueueEntry { delivery_time: 200, ttl: 2, scheduled: false, ..first.clone() };
    store.reschedule(&first, &second).unwrap();

    let third = QueueEntry { delivery_time: 300, ttl: 1, ..second.clone() };
    store.reschedule(&second, &third).unwrap();

    let stored = store.next(10).unwrap();
    assert_eq!(stored, vec![bystander, third]);
    assert_eq!(store.len().unwrap(), 2);
}

#[test]
fn enqueue_persists_due_unscheduled_entry() {
    let store = RedbRequestStore::open_in_memory().unwrap();
    let clock = TestClock::with_start_time(UNIX_EPOCH + Duration::from_secs(50));

    let entry = enqueue(&store, &clock, "PUT", "/items/9", 3).unwrap();

    assert_eq!(entry.delivery_time, 50_000_000_000);
    assert_eq!(entry.method, "PUT");
    assert_eq!(entry.target_path, "/items/9");
    assert_eq!(entry.ttl, 3);
    assert!(!entry.scheduled);
    assert_eq!(store.next(1).unwrap(), vec![entry]);
}

#[test]
fn enqueue_assigns_distinct_ids() {
    let store = RedbRequestStore::open_in_memory().unwrap();
    let clock = TestClock::new();

    let a = enqueue(&store, &clock, "GET", "/", 3).unwrap();
    let b = enqueue(&store, &clock, "GET", "/", 3).unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(store.len().unwrap(), 2);
}
