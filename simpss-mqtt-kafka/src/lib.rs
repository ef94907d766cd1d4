//! MQTT to Kafka bridge for SIMPSS sensor telemetry.
//!
//! Subscribes to an MQTT topic, enriches each reading with its receipt time
//! and sensor group, and produces it to the Kafka topic named after the
//! group.
//!
//! # Record flow
//!
//! ```text
//! MQTT publish ──► enrich ──► bounded queue ──► Kafka topic <sensor_group>
//!   {"id": 121, "T": 20}        + time_received, sensor_group
//! ```
//!
//! Malformed payloads and unknown sensors are logged and dropped. A full
//! queue either blocks ingest or drops the newest record, per configuration.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod producer;
pub mod queue;
pub mod stats;

pub use bridge::MqttKafkaBridge;
pub use config::{ConfigOverrides, MqttKafkaConfig};
pub use dispatch::{DispatchSettings, Dispatcher, FlushReport, StreamProducer};
pub use enrich::Enricher;
pub use error::{BridgeError, Result};
pub use ingest::{IngestHandler, MqttIngest};
pub use queue::{OverflowPolicy, QueueReceiver, QueueSender, bounded};
pub use stats::{BridgeStats, SharedStats};
