//! Ordered key encoding for queue entries.
//!
//! A key is `be(delivery_time as u64) || be(id)`: 16 bytes whose
//! lexicographic order equals ascending `(delivery_time, id)` order for
//! non-negative timestamps. The scheduler relies on this order to stop its
//! scan at the first entry that is not yet due, so the layout must not
//! change.

use crate::{error::StorageError, models::EntryId};

/// Length of an encoded key in bytes.
pub const KEY_LEN: usize = 16;

/// Encoded storage key.
pub type StorageKey = [u8; KEY_LEN];

/// Encodes `(delivery_time, id)` into a storage key.
pub fn encode(delivery_time: i64, id: EntryId) -> StorageKey {
    let mut key = [0u8; KEY_LEN];
    // Reinterpreting the bits keeps the encoding identical to an unsigned
    // big-endian write of the timestamp.
    key[..8].copy_from_slice(&(delivery_time as u64).to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

/// Decodes a storage key back into `(delivery_time, id)`.
///
/// # Errors
///
/// Returns `StorageError::CorruptKey` if `bytes` is not exactly 16 bytes.
pub fn decode(bytes: &[u8]) -> Result<(i64, EntryId), StorageError> {
    let key: &StorageKey =
        bytes.try_into().map_err(|_| StorageError::CorruptKey { len: bytes.len() })?;

    let mut time = [0u8; 8];
    let mut id = [0u8; 8];
    time.copy_from_slice(&key[..8]);
    id.copy_from_slice(&key[8..]);

    Ok((u64::from_be_bytes(time) as i64, EntryId(u64::from_be_bytes(id))))
}
