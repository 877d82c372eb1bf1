//! Property-based tests for queue ordering and key encoding.

use std::collections::HashSet;

use courier_core::{storage::key, EntryId, QueueEntry, RedbRequestStore, RequestStore};
use proptest::prelude::*;

/// Strategy for batches of entries with distinct ids.
fn entries_strategy() -> impl Strategy<Value = Vec<QueueEntry>> {
    prop::collection::vec((0i64..1_000_000, any::<u64>()), 1..40).prop_map(|pairs| {
        let mut seen = HashSet::new();
        pairs
            .into_iter()
            .filter(|(_, id)| seen.insert(*id))
            .map(|(time, id)| QueueEntry::new(EntryId(id), time, "GET", "/p", 3))
            .collect()
    })
}

proptest! {
    #[test]
    fn next_yields_time_then_id_order(entries in entries_strategy()) {
        let store = RedbRequestStore::open_in_memory().unwrap();
        for entry in &entries {
            store.put(entry).unwrap();
        }

        let stored = store.next(entries.len()).unwrap();
        prop_assert_eq!(stored.len(), entries.len());

        for pair in stored.windows(2) {
            let earlier = (pair[0].delivery_time, pair[0].id);
            let later = (pair[1].delivery_time, pair[1].id);
            prop_assert!(earlier < later, "{:?} should sort before {:?}", earlier, later);
        }
    }

    #[test]
    fn key_order_matches_tuple_order(
        a in (0i64..i64::MAX, any::<u64>()),
        b in (0i64..i64::MAX, any::<u64>()),
    ) {
        let key_a = key::encode(a.0, EntryId(a.1));
        let key_b = key::encode(b.0, EntryId(b.1));
        prop_assert_eq!(key_a.cmp(&key_b), (a.0, a.1).cmp(&(b.0, b.1)));
    }
}
