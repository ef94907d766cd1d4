//! Stream consumer adapter: a [`Publisher`] fed by a Kafka-like source.

use std::sync::Arc;
use std::time::Duration;

use simpss_common::{
    PublishReport, Publisher, Record, Subscriber, SubscriberRegistry, decode_record,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{PersistenceError, Result};
use crate::stats::{ConsumerStats, SharedStats};

/// One message fetched from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Message value, absent for tombstones.
    pub payload: Option<Vec<u8>>,
    /// Transport error reported in place of a message.
    pub error: Option<String>,
}

impl StreamMessage {
    /// A message carrying `payload`.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload: Some(payload),
            error: None,
        }
    }

    /// A transport error marker.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            topic: String::new(),
            partition: -1,
            offset: -1,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Source of stream messages.
pub trait StreamSource: Send {
    /// Register interest in `topics`.
    fn subscribe(&mut self, topics: &[String]) -> Result<()>;

    /// Fetch up to `max_messages`, waiting at most `timeout`.
    fn consume(&mut self, max_messages: usize, timeout: Duration) -> Result<Vec<StreamMessage>>;

    /// Release the connection.
    fn close(&mut self);
}

/// Lifecycle of a [`StreamConsumerAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Created, not consuming yet.
    Idle,
    Running,
    /// Shut down for good.
    Stopped,
}

/// Polls a [`StreamSource`] in batches and publishes each decoded record to
/// its subscribers.
pub struct StreamConsumerAdapter<S: StreamSource> {
    source: S,
    registry: SubscriberRegistry,
    topics: Vec<String>,
    batch_size: usize,
    poll_timeout: Duration,
    state: AdapterState,
    stats: Arc<SharedStats>,
}

impl<S: StreamSource> StreamConsumerAdapter<S> {
    pub fn new(source: S, batch_size: usize, poll_timeout: Duration) -> Self {
        Self {
            source,
            registry: SubscriberRegistry::new(),
            topics: Vec::new(),
            batch_size,
            poll_timeout,
            state: AdapterState::Idle,
            stats: Arc::new(SharedStats::new()),
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Registered subscriber names in registration order.
    pub fn subscriber_names(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    /// Shared counters, still readable once the adapter is gone.
    pub fn stats_handle(&self) -> Arc<SharedStats> {
        self.stats.clone()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.snapshot()
    }

    /// Register interest in `topics` before consuming.
    pub fn subscribe_topics(&mut self, topics: &[String]) -> Result<()> {
        if self.state == AdapterState::Stopped {
            return Err(PersistenceError::Stopped);
        }
        if topics.is_empty() {
            return Err(PersistenceError::config("no topics to subscribe to"));
        }

        self.source.subscribe(topics)?;
        for topic in topics {
            if !self.topics.contains(topic) {
                self.topics.push(topic.clone());
            }
        }

        info!(topics = ?self.topics, "Subscribed to topics");
        Ok(())
    }

    /// Fetch one batch and publish every decodable record in it.
    ///
    /// Returns the number of records published.
    pub fn poll_once(&mut self) -> Result<usize> {
        let batch = self.source.consume(self.batch_size, self.poll_timeout)?;
        self.stats.update(|s| {
            s.batches += 1;
            s.messages += batch.len() as u64;
        });

        let mut published = 0;
        for message in batch {
            if let Some(record) = self.decode(message) {
                let report = self.registry.publish(&record);
                self.log_report(report);
                published += 1;
            }
        }

        Ok(published)
    }

    /// Consume until `shutdown` fires, then shut down.
    ///
    /// A stopped adapter cannot be started again.
    pub fn start_consuming(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        match self.state {
            AdapterState::Stopped => return Err(PersistenceError::Stopped),
            AdapterState::Running => {
                return Err(PersistenceError::config("consumer adapter is already running"));
            }
            AdapterState::Idle => {}
        }
        if self.topics.is_empty() {
            return Err(PersistenceError::config(
                "subscribe to topics before consuming",
            ));
        }

        self.state = AdapterState::Running;
        info!(
            topics = ?self.topics,
            subscribers = self.registry.len(),
            batch_size = self.batch_size,
            "Consuming"
        );

        while !*shutdown.borrow_and_update() {
            if let Err(e) = self.poll_once() {
                warn!(error = %e, "Failed to fetch batch");
                std::thread::sleep(self.poll_timeout);
            }
        }

        info!("Shutdown signal received, stopping consumer");
        self.shutdown();
        Ok(())
    }

    /// Drop every subscriber and release the source.
    pub fn shutdown(&mut self) {
        if self.state == AdapterState::Stopped {
            return;
        }

        self.registry.clear();
        self.source.close();
        self.state = AdapterState::Stopped;
        info!("Consumer adapter stopped");
    }

    fn decode(&self, message: StreamMessage) -> Option<Record> {
        if let Some(error) = message.error {
            debug!(error = %error, "Skipping transport error");
            self.stats.update(|s| s.transport_errors += 1);
            return None;
        }

        let Some(payload) = message.payload else {
            debug!(
                topic = %message.topic,
                offset = message.offset,
                "Skipping message without payload"
            );
            self.stats.update(|s| s.empty_payloads += 1);
            return None;
        };

        match decode_record(&payload) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Dropping undecodable message"
                );
                self.stats.update(|s| s.decode_errors += 1);
                None
            }
        }
    }

    fn log_report(&self, report: PublishReport) {
        let failures = report.failures.len() as u64;
        for (name, e) in report.failures {
            if e.is_per_record() {
                warn!(subscriber = %name, error = %e, "Subscriber rejected record");
            } else {
                error!(subscriber = %name, error = %e, "Subscriber failed");
            }
        }

        self.stats.update(|s| {
            s.published += 1;
            s.subscriber_failures += failures;
        });
    }
}

impl<S: StreamSource> Publisher for StreamConsumerAdapter<S> {
    fn add_subscriber(
        &mut self,
        subscriber: Box<dyn Subscriber>,
        name: &str,
    ) -> simpss_common::Result<()> {
        self.registry.add(name, subscriber)?;
        info!(subscriber = %name, "Subscriber added");
        Ok(())
    }

    fn remove_subscriber(&mut self, name: &str) {
        if self.registry.remove(name).is_some() {
            info!(subscriber = %name, "Subscriber removed");
        }
    }

    fn publish(&mut self, record: &Record) -> PublishReport {
        self.registry.publish(record)
    }
}
