//! Kafka-backed [`StreamSource`].

use std::time::{Duration, Instant};

use rdkafka::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::TopicPartitionList;
use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::consumer::{StreamMessage, StreamSource};
use crate::error::Result;

/// Consumer context that logs client errors and failed commits.
pub struct ConsumerLogger;

impl ClientContext for ConsumerLogger {
    fn error(&self, error: KafkaError, reason: &str) {
        warn!(error = %error, reason, "Kafka client error");
    }
}

impl ConsumerContext for ConsumerLogger {
    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(e) = result {
            warn!(error = %e, "Offset commit failed");
        }
    }
}

/// [`StreamSource`] over a poll-driven librdkafka consumer.
pub struct KafkaStreamSource {
    consumer: BaseConsumer<ConsumerLogger>,
}

impl KafkaStreamSource {
    /// Create the consumer from configuration.
    pub fn new(config: &ConsumerConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.properties() {
            client_config.set(key, value);
        }

        let consumer: BaseConsumer<ConsumerLogger> =
            client_config.create_with_context(ConsumerLogger)?;

        info!(
            group_id = %config.group_id,
            bootstrap_servers = %config.client.bootstrap_servers,
            "Created Kafka consumer"
        );

        Ok(Self { consumer })
    }
}

impl StreamSource for KafkaStreamSource {
    fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        Ok(())
    }

    fn consume(&mut self, max_messages: usize, timeout: Duration) -> Result<Vec<StreamMessage>> {
        let deadline = Instant::now() + timeout;
        let mut batch = Vec::with_capacity(max_messages);

        while batch.len() < max_messages {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.consumer.poll(remaining) {
                None => break,
                Some(Ok(message)) => batch.push(StreamMessage {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec),
                    error: None,
                }),
                Some(Err(e)) => batch.push(StreamMessage::failed(e.to_string())),
            }
        }

        Ok(batch)
    }

    fn close(&mut self) {
        debug!("Unsubscribing Kafka consumer");
        self.consumer.unsubscribe();
    }
}
