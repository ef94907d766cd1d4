//! Kafka producer with per-message delivery reporting.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext};
use tracing::{debug, info, warn};

use crate::config::ProducerConfig;
use crate::dispatch::StreamProducer;
use crate::error::Result;
use crate::stats::SharedStats;

/// Producer context that logs every delivery report.
///
/// Failures are logged and counted, never retried.
pub struct DeliveryReporter {
    stats: Arc<SharedStats>,
}

impl DeliveryReporter {
    pub fn new(stats: Arc<SharedStats>) -> Self {
        Self { stats }
    }
}

impl ClientContext for DeliveryReporter {
    fn error(&self, error: KafkaError, reason: &str) {
        warn!(error = %error, reason, "Kafka client error");
    }
}

impl ProducerContext for DeliveryReporter {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        match result {
            Ok(message) => {
                debug!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    "Message delivered"
                );
                self.stats.update(|s| s.delivered += 1);
            }
            Err((error, message)) => {
                warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    error = %error,
                    "Message delivery failed"
                );
                self.stats.update(|s| s.delivery_failed += 1);
            }
        }
    }
}

/// [`StreamProducer`] backed by a poll-driven librdkafka producer.
pub struct KafkaStreamProducer {
    producer: BaseProducer<DeliveryReporter>,
    /// Time spent serving callbacks when the local queue is full.
    backoff: Duration,
}

impl KafkaStreamProducer {
    /// Create the producer from configuration.
    pub fn new(config: &ProducerConfig, stats: Arc<SharedStats>) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.properties() {
            client_config.set(key, value);
        }

        let producer: BaseProducer<DeliveryReporter> =
            client_config.create_with_context(DeliveryReporter::new(stats))?;

        info!(
            producer = %config.producer_name(),
            bootstrap_servers = %config.client.bootstrap_servers,
            "Created Kafka producer"
        );

        Ok(Self {
            producer,
            backoff: Duration::from_millis(100),
        })
    }
}

impl StreamProducer for KafkaStreamProducer {
    fn produce(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let record = BaseRecord::<(), [u8]>::to(topic).payload(payload);

        match self.producer.send(record) {
            Ok(()) => Ok(()),
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), record)) => {
                // Serve delivery callbacks to free local queue space, then try once more.
                debug!(topic, "Producer queue full, polling before retry");
                self.producer.poll(self.backoff);
                self.producer.send(record).map_err(|(e, _)| e.into())
            }
            Err((e, _)) => Err(e.into()),
        }
    }

    fn poll(&self, timeout: Duration) {
        self.producer.poll(timeout);
    }

    fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(timeout)?;
        Ok(())
    }

    fn in_flight(&self) -> usize {
        usize::try_from(self.producer.in_flight_count()).unwrap_or(0)
    }
}
