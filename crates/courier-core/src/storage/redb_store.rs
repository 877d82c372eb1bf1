//! redb-backed request store.
//!
//! One table maps 16-byte ordered keys to JSON-encoded entries. Every
//! operation runs in its own transaction; reschedule performs the delete
//! and insert inside a single write transaction so a crash can never leave
//! zero or two records for one entry.

use std::{path::Path, sync::Arc};

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use tracing::debug;

use super::{key, RequestStore};
use crate::{
    error::{Result, StorageError},
    models::QueueEntry,
};

/// Pending entries keyed by `be(delivery_time) || be(id)`.
const REQUESTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("requests");

/// Convert any `Display` error into a `StorageError` variant.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StorageError::$variant(e.to_string())
    };
}

/// Thread-safe request store backed by redb.
///
/// Cloning is cheap and clones share the same database handle.
#[derive(Clone)]
pub struct RedbRequestStore {
    db: Arc<Database>,
}

impl RedbRequestStore {
    /// Opens (or creates) a persistent store at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Open` if the file cannot be opened or is not a
    /// redb database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "request store opened");
        Ok(store)
    }

    /// Creates an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Open` if the backend cannot be initialized.
    pub fn open_in_memory() -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory request store opened");
        Ok(store)
    }

    fn ensure_table(&self) -> Result<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(REQUESTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

fn encode_value(entry: &QueueEntry) -> Result<Vec<u8>> {
    serde_json::to_vec(entry).map_err(map_err!(Serialize))
}

fn decode_value(key_bytes: &[u8], value: &[u8]) -> Result<QueueEntry> {
    key::decode(key_bytes)?;
    serde_json::from_slice(value).map_err(map_err!(Deserialize))
}

impl RequestStore for RedbRequestStore {
    fn put(&self, entry: &QueueEntry) -> Result<()> {
        let key = entry.storage_key();
        let value = encode_value(entry)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REQUESTS).map_err(map_err!(Table))?;
            table.insert(key.as_slice(), value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn next(&self, n: usize) -> Result<Vec<QueueEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REQUESTS).map_err(map_err!(Table))?;
        let mut entries = Vec::new();
        for record in table.iter().map_err(map_err!(Read))?.take(n) {
            let (key, value) = record.map_err(map_err!(Read))?;
            entries.push(decode_value(key.value(), value.value())?);
        }
        Ok(entries)
    }

    fn reschedule(&self, old: &QueueEntry, new: &QueueEntry) -> Result<()> {
        let old_key = old.storage_key();
        let new_key = new.storage_key();
        let value = encode_value(new)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REQUESTS).map_err(map_err!(Table))?;
            table.remove(old_key.as_slice()).map_err(map_err!(Write))?;
            table.insert(new_key.as_slice(), value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(entry_id = %new.id, delivery_time = new.delivery_time, "entry rescheduled");
        Ok(())
    }

    fn delete(&self, entry: &QueueEntry) -> Result<()> {
        let key = entry.storage_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(REQUESTS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_slice()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(entry_id = %entry.id, existed, "entry deleted");
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REQUESTS).map_err(map_err!(Table))?;
        let len = table.len().map_err(map_err!(Read))?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryId;

    fn store() -> RedbRequestStore {
        RedbRequestStore::open_in_memory().unwrap()
    }

    fn entry(id: u64, delivery_time: i64) -> QueueEntry {
        QueueEntry::new(EntryId(id), delivery_time, "GET", format!("/{id}"), 3)
    }

    #[test]
    fn empty_store_yields_empty_batch() {
        let store = store();
        assert!(store.next(10).unwrap().is_empty());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn put_is_an_upsert() {
        let store = store();
        let original = entry(1, 100);
        store.put(&original).unwrap();
        store.put(&original.claimed()).unwrap();

        let stored = store.next(10).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].scheduled);
    }

    #[test]
    fn next_returns_ascending_delivery_time() {
        let store = store();
        for (id, time) in [(1, 300), (2, 100), (3, 200)] {
            store.put(&entry(id, time)).unwrap();
        }

        let times: Vec<i64> = store.next(10).unwrap().iter().map(|e| e.delivery_time).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn next_respects_limit() {
        let store = store();
        for id in 0..5 {
            store.put(&entry(id, i64::try_from(id).unwrap())).unwrap();
        }

        let batch = store.next(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, EntryId(0));
        assert_eq!(batch[1].id, EntryId(1));
        assert!(store.next(0).unwrap().is_empty());
    }

    #[test]
    fn identical_times_break_ties_by_id() {
        let store = store();
        store.put(&entry(9, 500)).unwrap();
        store.put(&entry(4, 500)).unwrap();

        let first = store.next(1).unwrap();
        assert_eq!(first[0].id, EntryId(4));
    }

    #[test]
    fn reschedule_moves_the_record() {
        let store = store();
        let old = entry(1, 100).claimed();
        store.put(&old).unwrap();

        let new = QueueEntry { delivery_time: 200, ttl: 2, scheduled: false, ..old.clone() };
        store.reschedule(&old, &new).unwrap();

        let stored = store.next(10).unwrap();
        assert_eq!(stored, vec![new]);
    }

    #[test]
    fn delete_missing_key_is_not_an_error() {
        let store = store();
        store.delete(&entry(1, 100)).unwrap();

        store.put(&entry(2, 100)).unwrap();
        store.delete(&entry(2, 100)).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn health_check_passes_on_open_store() {
        assert!(store().health_check().is_ok());
    }
}
