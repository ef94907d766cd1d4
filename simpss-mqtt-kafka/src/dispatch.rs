//! Dispatch path: drains the queue into per-group stream topics.

use std::sync::Arc;
use std::time::Duration;

use simpss_common::{Record, SENSOR_GROUP, encode_record};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::queue::QueueReceiver;
use crate::stats::SharedStats;

/// Minimal producer surface the dispatch loop needs.
///
/// Implemented by [`KafkaStreamProducer`](crate::producer::KafkaStreamProducer)
/// and by in-memory producers in tests.
pub trait StreamProducer: Send {
    /// Queue `payload` for delivery to `topic`.
    fn produce(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Serve delivery callbacks, waiting at most `timeout`.
    fn poll(&self, timeout: Duration);

    /// Wait until every queued message is delivered or `timeout` elapses.
    fn flush(&self, timeout: Duration) -> Result<()>;

    /// Messages produced but not yet acknowledged.
    fn in_flight(&self) -> usize;
}

/// Timing of the dispatch loop.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Producer poll per cycle. Also paces the loop when the queue is idle.
    pub poll_timeout: Duration,
    /// Bound on the final flush.
    pub flush_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(300),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of the shutdown flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Records drained from the queue after shutdown was signalled.
    pub drained: usize,
    /// Records still unacknowledged when the flush timed out.
    pub lost: usize,
}

/// Single consumer of the bridge queue.
pub struct Dispatcher<P: StreamProducer> {
    producer: P,
    queue: QueueReceiver,
    stats: Arc<SharedStats>,
    settings: DispatchSettings,
}

impl<P: StreamProducer> Dispatcher<P> {
    pub fn new(
        producer: P,
        queue: QueueReceiver,
        stats: Arc<SharedStats>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            producer,
            queue,
            stats,
            settings,
        }
    }

    /// Get a reference to the underlying producer.
    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Drain the queue without blocking, producing each record.
    ///
    /// Returns the number of records handed to the producer.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut sent = 0;
        while let Some(record) = self.queue.try_dequeue() {
            if self.dispatch(&record) {
                sent += 1;
            }
        }
        sent
    }

    /// One cycle: drain, then poll the producer once.
    pub fn run_cycle(&mut self) -> usize {
        let sent = self.dispatch_pending();
        self.producer.poll(self.settings.poll_timeout);
        sent
    }

    /// Run cycles until shutdown is signalled or the ingest side goes away.
    ///
    /// Blocks the calling thread; run it on a blocking worker.
    pub fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            poll_timeout_ms = self.settings.poll_timeout.as_millis() as u64,
            "Dispatch loop started"
        );

        while !*shutdown.borrow() && !self.queue.is_closed() {
            let sent = self.run_cycle();
            if sent > 0 {
                debug!(records = sent, "Dispatched records");
            }
        }

        // Lost records are reported by the flush, never retried.
        self.shutdown();
        Ok(())
    }

    /// Close the queue, dispatch what is left and flush the producer.
    pub fn shutdown(mut self) -> FlushReport {
        self.queue.close();
        let drained = self.dispatch_pending();

        info!(
            drained,
            in_flight = self.producer.in_flight(),
            timeout_secs = self.settings.flush_timeout.as_secs(),
            "Flushing stream producer"
        );

        let lost = match self.producer.flush(self.settings.flush_timeout) {
            Ok(()) => 0,
            Err(e) => {
                let lost = self.producer.in_flight();
                warn!(error = %e, lost, "Records not flushed in time are lost");
                lost
            }
        };

        info!(drained, lost, "Dispatch loop stopped");
        FlushReport { drained, lost }
    }

    fn dispatch(&self, record: &Record) -> bool {
        let Some(topic) = record.get(SENSOR_GROUP).map(ToString::to_string) else {
            warn!("Record without sensor group, dropping");
            self.stats.update(|s| s.produce_failed += 1);
            return false;
        };

        let payload = match encode_record(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to encode record");
                self.stats.update(|s| s.produce_failed += 1);
                return false;
            }
        };

        match self.producer.produce(&topic, &payload) {
            Ok(()) => {
                self.stats.update(|s| s.dispatched += 1);
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to produce record");
                self.stats.update(|s| s.produce_failed += 1);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::queue::{OverflowPolicy, bounded};
    use parking_lot::Mutex;
    use simpss_common::{TIME_RECEIVED, decode_record};

    #[derive(Default)]
    struct RecordingProducer {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        polls: Mutex<usize>,
        reject_topic: Option<String>,
        stuck: usize,
    }

    impl StreamProducer for RecordingProducer {
        fn produce(&self, topic: &str, payload: &[u8]) -> Result<()> {
            if self.reject_topic.as_deref() == Some(topic) {
                return Err(BridgeError::config("unknown topic"));
            }
            self.sent.lock().push((topic.to_string(), payload.to_vec()));
            Ok(())
        }

        fn poll(&self, _timeout: Duration) {
            *self.polls.lock() += 1;
        }

        fn flush(&self, _timeout: Duration) -> Result<()> {
            if self.stuck > 0 {
                Err(BridgeError::config("flush timed out"))
            } else {
                Ok(())
            }
        }

        fn in_flight(&self) -> usize {
            self.stuck
        }
    }

    fn enriched(id: i64, group: &str) -> Record {
        Record::new()
            .with("id", id)
            .with(SENSOR_GROUP, group)
            .with(TIME_RECEIVED, 1_700_000_000.5)
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            poll_timeout: Duration::from_millis(1),
            flush_timeout: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_group_in_order() {
        let (tx, rx) = bounded(8, OverflowPolicy::Block);
        let stats = Arc::new(SharedStats::new());
        let mut dispatcher =
            Dispatcher::new(RecordingProducer::default(), rx, stats.clone(), settings());

        tx.enqueue(enriched(120, "g1")).await.unwrap();
        tx.enqueue(enriched(122, "g2")).await.unwrap();
        tx.enqueue(enriched(121, "g1")).await.unwrap();

        assert_eq!(dispatcher.run_cycle(), 3);
        assert_eq!(*dispatcher.producer().polls.lock(), 1);

        let sent = dispatcher.producer().sent.lock().clone();
        let topics: Vec<_> = sent.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(topics, ["g1", "g2", "g1"]);

        let first = decode_record(&sent[0].1).unwrap();
        assert_eq!(first, enriched(120, "g1"));
        assert_eq!(stats.snapshot().dispatched, 3);
    }

    #[tokio::test]
    async fn test_empty_cycle_still_polls() {
        let (_tx, rx) = bounded(8, OverflowPolicy::Block);
        let mut dispatcher = Dispatcher::new(
            RecordingProducer::default(),
            rx,
            Arc::new(SharedStats::new()),
            settings(),
        );

        assert_eq!(dispatcher.run_cycle(), 0);
        assert_eq!(*dispatcher.producer().polls.lock(), 1);
    }

    #[tokio::test]
    async fn test_produce_failure_does_not_stop_drain() {
        let (tx, rx) = bounded(8, OverflowPolicy::Block);
        let stats = Arc::new(SharedStats::new());
        let producer = RecordingProducer {
            reject_topic: Some("g2".to_string()),
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(producer, rx, stats.clone(), settings());

        tx.enqueue(enriched(122, "g2")).await.unwrap();
        tx.enqueue(Record::new().with("id", 1)).await.unwrap();
        tx.enqueue(enriched(120, "g1")).await.unwrap();

        assert_eq!(dispatcher.dispatch_pending(), 1);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.dispatched, 1);
        assert_eq!(snapshot.produce_failed, 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_reports_lost() {
        let (tx, rx) = bounded(8, OverflowPolicy::Block);
        let producer = RecordingProducer {
            stuck: 2,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(producer, rx, Arc::new(SharedStats::new()), settings());

        tx.enqueue(enriched(120, "g1")).await.unwrap();
        let report = dispatcher.shutdown();

        assert_eq!(report, FlushReport { drained: 1, lost: 2 });
        assert!(tx.enqueue(enriched(121, "g1")).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_stops_on_shutdown_signal() {
        let (tx, rx) = bounded(8, OverflowPolicy::Block);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(
            RecordingProducer::default(),
            rx,
            Arc::new(SharedStats::new()),
            settings(),
        );

        let handle = tokio::task::spawn_blocking(move || dispatcher.run(shutdown_rx));
        tx.enqueue(enriched(120, "g1")).await.unwrap();
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatch loop should stop")
            .unwrap()
            .unwrap();
    }
}
