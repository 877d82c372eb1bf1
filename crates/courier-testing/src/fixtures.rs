//! Builders for queue entries with sensible defaults.

use courier_core::{EntryId, QueueEntry, DEFAULT_TTL};

/// Builder for test queue entries.
///
/// Defaults: random id, `delivery_time` 0, `GET /`, default TTL,
/// unscheduled.
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    entry: QueueEntry,
}

impl EntryBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self { entry: QueueEntry::new(EntryId::new(), 0, "GET", "/", DEFAULT_TTL) }
    }

    /// Sets the entry id.
    #[must_use]
    pub fn id(mut self, id: u64) -> Self {
        self.entry.id = EntryId(id);
        self
    }

    /// Sets the delivery time in nanoseconds since the Unix epoch.
    #[must_use]
    pub fn delivery_time(mut self, nanos: i64) -> Self {
        self.entry.delivery_time = nanos;
        self
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.entry.method = method.into();
        self
    }

    /// Sets the target path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.entry.target_path = path.into();
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.entry.ttl = ttl;
        self
    }

    /// Marks the entry as claimed.
    #[must_use]
    pub fn scheduled(mut self) -> Self {
        self.entry.scheduled = true;
        self
    }

    /// Builds the entry.
    pub fn build(self) -> QueueEntry {
        self.entry
    }
}

impl Default for EntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
