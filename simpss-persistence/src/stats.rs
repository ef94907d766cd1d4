//! Consumer counters, readable after the consume loop has finished.

use parking_lot::RwLock;

/// Statistics for the stream consumer adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Batches requested from the stream.
    pub batches: u64,
    /// Messages received, including skipped ones.
    pub messages: u64,
    /// Messages carrying a transport error.
    pub transport_errors: u64,
    /// Messages without a payload.
    pub empty_payloads: u64,
    /// Payloads that were not valid JSON objects.
    pub decode_errors: u64,
    /// Records fanned out to the subscribers.
    pub published: u64,
    /// Subscriber receive calls that failed.
    pub subscriber_failures: u64,
}

/// Thread-safe holder for [`ConsumerStats`].
#[derive(Debug, Default)]
pub struct SharedStats {
    inner: RwLock<ConsumerStats>,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, f: impl FnOnce(&mut ConsumerStats)) {
        f(&mut self.inner.write());
    }

    pub fn snapshot(&self) -> ConsumerStats {
        self.inner.read().clone()
    }
}
