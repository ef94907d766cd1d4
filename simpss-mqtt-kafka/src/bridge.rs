//! Wiring of the ingest and dispatch paths around one bounded queue.

use std::sync::Arc;

use simpss_common::SensorGroups;
use simpss_service_framework::{ServiceConfig, ServiceRunner};
use tracing::info;

use crate::config::MqttKafkaConfig;
use crate::dispatch::{DispatchSettings, Dispatcher, StreamProducer};
use crate::enrich::Enricher;
use crate::error::Result;
use crate::ingest::{IngestHandler, MqttIngest};
use crate::producer::KafkaStreamProducer;
use crate::queue::bounded;
use crate::stats::{BridgeStats, SharedStats};

/// MQTT to Kafka bridge.
///
/// Ingest runs as an async task and dispatch on a blocking thread. The
/// queue is the only state they share.
pub struct MqttKafkaBridge {
    config: MqttKafkaConfig,
    groups: Arc<SensorGroups>,
    stats: Arc<SharedStats>,
}

impl MqttKafkaBridge {
    pub fn new(config: MqttKafkaConfig, groups: Arc<SensorGroups>) -> Self {
        Self {
            config,
            groups,
            stats: Arc::new(SharedStats::new()),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &MqttKafkaConfig {
        &self.config
    }

    /// Get a copy of the bridge counters.
    pub fn stats(&self) -> BridgeStats {
        self.stats.snapshot()
    }

    /// Build both paths around `producer`, connected by a fresh queue.
    pub fn build<P: StreamProducer>(&self, producer: P) -> Result<(MqttIngest, Dispatcher<P>)> {
        let queue = &self.config.queue;
        let (tx, rx) = bounded(queue.capacity, queue.policy);

        let enricher = Enricher::new(self.groups.clone(), self.config.mqtt.payload_key.clone());
        let handler = IngestHandler::new(enricher, tx, self.stats.clone());
        let ingest = MqttIngest::new(&self.config.mqtt, handler, queue.disconnect_grace())?;

        let dispatcher = Dispatcher::new(
            producer,
            rx,
            self.stats.clone(),
            DispatchSettings {
                poll_timeout: queue.produce_poll_timeout(),
                flush_timeout: queue.flush_timeout(),
            },
        );

        Ok((ingest, dispatcher))
    }

    /// Create the Kafka producer and spawn both paths on `runner`.
    pub fn spawn<C: ServiceConfig>(&self, runner: &mut ServiceRunner<C>) -> Result<()> {
        let producer = KafkaStreamProducer::new(&self.config.kafka, self.stats.clone())?;
        let (ingest, dispatcher) = self.build(producer)?;

        info!(
            capacity = self.config.queue.capacity,
            policy = ?self.config.queue.policy,
            "Starting bridge"
        );

        let shutdown = runner.shutdown_signal();
        runner.spawn_blocking_with_error("kafka-dispatch", move || dispatcher.run(shutdown));

        let shutdown = runner.shutdown_signal();
        runner.spawn_with_error("mqtt-ingest", ingest.run(shutdown));

        Ok(())
    }
}
