//! Fault-injecting request store.
//!
//! Wraps a real store and fails selected operations on demand, so tests can
//! drive the scheduler and workers through their storage failure paths.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use courier_core::{QueueEntry, RequestStore, Result, StorageError};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `put`
    Put,
    /// `next`
    Next,
    /// `reschedule`
    Reschedule,
    /// `delete`
    Delete,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Always,
    Times(usize),
}

/// `RequestStore` wrapper with per-operation failure injection.
pub struct FaultyStore {
    inner: Arc<dyn RequestStore>,
    faults: Mutex<HashMap<StoreOp, Fault>>,
    failures: Mutex<HashMap<StoreOp, usize>>,
}

impl FaultyStore {
    /// Wraps `inner`; every operation succeeds until a fault is armed.
    pub fn new(inner: Arc<dyn RequestStore>) -> Self {
        Self { inner, faults: Mutex::default(), failures: Mutex::default() }
    }

    /// Makes every future `op` fail.
    pub fn fail_always(&self, op: StoreOp) {
        self.lock_faults().insert(op, Fault::Always);
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_times(&self, op: StoreOp, times: usize) {
        self.lock_faults().insert(op, Fault::Times(times));
    }

    /// Disarms any fault on `op`.
    pub fn heal(&self, op: StoreOp) {
        self.lock_faults().remove(&op);
    }

    /// Number of injected failures of `op` so far.
    pub fn failure_count(&self, op: StoreOp) -> usize {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner).get(&op).copied().unwrap_or(0)
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, HashMap<StoreOp, Fault>> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        let mut faults = self.lock_faults();
        let fire = match faults.get_mut(&op) {
            Some(Fault::Always) => true,
            Some(Fault::Times(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                true
            },
            _ => false,
        };
        drop(faults);

        if !fire {
            return Ok(());
        }

        *self.failures.lock().unwrap_or_else(PoisonError::into_inner).entry(op).or_default() += 1;
        tracing::debug!(?op, "injecting storage failure");
        Err(match op {
            StoreOp::Next => StorageError::Read(format!("injected {op:?} failure")),
            _ => StorageError::Write(format!("injected {op:?} failure")),
        })
    }
}

impl RequestStore for FaultyStore {
    fn put(&self, entry: &QueueEntry) -> Result<()> {
        self.check(StoreOp::Put)?;
        self.inner.put(entry)
    }

    fn next(&self, n: usize) -> Result<Vec<QueueEntry>> {
        self.check(StoreOp::Next)?;
        self.inner.next(n)
    }

    fn reschedule(&self, old: &QueueEntry, new: &QueueEntry) -> Result<()> {
        self.check(StoreOp::Reschedule)?;
        self.inner.reschedule(old, new)
    }

    fn delete(&self, entry: &QueueEntry) -> Result<()> {
        self.check(StoreOp::Delete)?;
        self.inner.delete(entry)
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }
}
