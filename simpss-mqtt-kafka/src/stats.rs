//! Bridge counters shared by the ingest, dispatch and delivery paths.

use parking_lot::RwLock;

/// Statistics for the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// MQTT messages received.
    pub received: u64,
    /// Payloads that were not valid JSON objects.
    pub decode_errors: u64,
    /// Records whose sensor id has no group.
    pub unknown_sensor: u64,
    /// Enriched records placed on the queue.
    pub enqueued: u64,
    /// Records discarded because the queue was full.
    pub dropped: u64,
    /// Records handed to the Kafka producer.
    pub dispatched: u64,
    /// Records the Kafka producer refused.
    pub produce_failed: u64,
    /// Delivery reports with success.
    pub delivered: u64,
    /// Delivery reports with an error.
    pub delivery_failed: u64,
}

/// Thread-safe holder for [`BridgeStats`].
#[derive(Debug, Default)]
pub struct SharedStats {
    inner: RwLock<BridgeStats>,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an update under the write lock.
    pub fn update(&self, f: impl FnOnce(&mut BridgeStats)) {
        f(&mut self.inner.write());
    }

    /// Get a copy of the current counters.
    pub fn snapshot(&self) -> BridgeStats {
        self.inner.read().clone()
    }
}
