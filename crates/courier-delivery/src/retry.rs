//! Fixed-interval retry policy with a per-entry retry budget.
//!
//! Every failed attempt pushes the entry's `delivery_time` forward by the
//! same backoff, measured from its previous `delivery_time` rather than
//! from the failure instant, and consumes one unit of `ttl`. An entry
//! whose budget reaches zero is expired.

use std::time::Duration;

use courier_core::QueueEntry;

/// Retry policy applied to failed deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Interval added to `delivery_time` after each failure.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff: Duration::from_millis(crate::DEFAULT_RETRY_BACKOFF_MS) }
    }
}

/// What to do with an entry after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Replace the stored entry with `next`.
    Retry {
        /// Same id, path and method; later `delivery_time`, lower `ttl`,
        /// unscheduled.
        next: QueueEntry,
    },
    /// Retry budget exhausted; delete the entry.
    Expire,
}

impl RetryPolicy {
    /// Creates a policy with the given fixed backoff.
    pub const fn fixed(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Backoff in nanoseconds, saturating at `i64::MAX`.
    pub fn backoff_nanos(&self) -> i64 {
        i64::try_from(self.backoff.as_nanos()).unwrap_or(i64::MAX)
    }

    /// Decides the fate of `entry` after a failed delivery attempt.
    pub fn decide(&self, entry: &QueueEntry) -> RetryDecision {
        let ttl = entry.ttl.saturating_sub(1);
        if ttl == 0 {
            return RetryDecision::Expire;
        }

        let next = QueueEntry {
            delivery_time: entry.delivery_time.saturating_add(self.backoff_nanos()),
            ttl,
            scheduled: false,
            ..entry.clone()
        };
        RetryDecision::Retry { next }
    }
}
