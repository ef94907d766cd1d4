//! Configuration for the MQTT to Kafka bridge.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simpss_service_framework::{
    KafkaConfig, LoggingConfig, SensorGroupsConfig, ServiceConfig, ServiceError,
};

use crate::queue::OverflowPolicy;

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MqttKafkaConfig {
    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Kafka producer settings
    #[serde(default)]
    pub kafka: ProducerConfig,

    /// Bounded queue between ingest and dispatch
    #[serde(default)]
    pub queue: QueueConfig,

    /// Sensor to group table
    #[serde(default)]
    pub sensor_groups: SensorGroupsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT broker connection and subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host (default: "localhost")
    #[serde(default = "default_mqtt_address")]
    pub address: String,

    /// Broker port (default: 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// MQTT client identifier (default: "prod1")
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,

    /// Topic the sensors publish on (default: "simpss")
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,

    /// Subscription QoS level, 0 to 2 (default: 2)
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Maximum unacknowledged outgoing messages (default: 100)
    #[serde(default = "default_max_inflight")]
    pub max_inflight: u16,

    /// Payload field holding the sensor id (default: "id")
    #[serde(default = "default_payload_key")]
    pub payload_key: String,

    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Delay before polling again after a connection error (default: 1000)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Optional username
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_address() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "prod1".to_string()
}

fn default_mqtt_topic() -> String {
    "simpss".to_string()
}

fn default_qos() -> u8 {
    2
}

fn default_max_inflight() -> u16 {
    100
}

fn default_payload_key() -> String {
    "id".to_string()
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            address: default_mqtt_address(),
            port: default_mqtt_port(),
            client_id: default_mqtt_client_id(),
            topic: default_mqtt_topic(),
            qos: default_qos(),
            max_inflight: default_max_inflight(),
            payload_key: default_payload_key(),
            keepalive_secs: default_keepalive_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            username: None,
            password: None,
        }
    }
}

impl MqttConfig {
    /// Keep-alive interval.
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Backoff after a connection error.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Kafka producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Shared connection settings
    #[serde(flatten)]
    pub client: KafkaConfig,

    /// Client id reported to the brokers (default: "k-prod-1")
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Group id, used to name the producer in logs (default: "1")
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Batching delay in milliseconds (default: 1)
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,

    /// Maximum in-flight requests per broker connection (default: 100)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u32,
}

fn default_client_id() -> String {
    "k-prod-1".to_string()
}

fn default_group_id() -> String {
    "1".to_string()
}

fn default_linger_ms() -> u64 {
    1
}

fn default_max_in_flight() -> u32 {
    100
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            client: KafkaConfig::default(),
            client_id: default_client_id(),
            group_id: default_group_id(),
            linger_ms: default_linger_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl ProducerConfig {
    /// Producer properties as librdkafka key/value pairs.
    pub fn properties(&self) -> Vec<(String, String)> {
        self.client.properties_with([
            ("client.id".to_string(), self.client_id.clone()),
            ("group.id".to_string(), self.group_id.clone()),
            ("linger.ms".to_string(), self.linger_ms.to_string()),
            ("max.in.flight".to_string(), self.max_in_flight.to_string()),
        ])
    }

    /// Name used in log lines, `<group.id>-<client.id>`.
    pub fn producer_name(&self) -> String {
        format!("{}-{}", self.group_id, self.client_id)
    }
}

/// Queue and dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of enriched records waiting for dispatch (default: 5000)
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Behaviour when the queue is full (default: block)
    #[serde(default)]
    pub policy: OverflowPolicy,

    /// Producer poll timeout per dispatch cycle in milliseconds (default: 300)
    #[serde(default = "default_produce_poll_timeout_ms")]
    pub produce_poll_timeout_ms: u64,

    /// Producer flush timeout at shutdown in seconds (default: 5)
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,

    /// Time the MQTT loop keeps running after unsubscribing (default: 2)
    #[serde(default = "default_disconnect_grace_secs")]
    pub disconnect_grace_secs: u64,
}

fn default_capacity() -> usize {
    5000
}

fn default_produce_poll_timeout_ms() -> u64 {
    300
}

fn default_flush_timeout_secs() -> u64 {
    5
}

fn default_disconnect_grace_secs() -> u64 {
    2
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            policy: OverflowPolicy::default(),
            produce_poll_timeout_ms: default_produce_poll_timeout_ms(),
            flush_timeout_secs: default_flush_timeout_secs(),
            disconnect_grace_secs: default_disconnect_grace_secs(),
        }
    }
}

impl QueueConfig {
    pub fn produce_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.produce_poll_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }
}

/// Deployment overrides read from the command line or the environment.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// MQTT broker host.
    #[arg(long, env = "MQTT_ADDRESS")]
    pub mqtt_address: Option<String>,

    /// MQTT topic to subscribe to.
    #[arg(long, env = "MQTT_TOPIC")]
    pub mqtt_topic: Option<String>,

    /// Kafka bootstrap servers.
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS")]
    pub kafka_bootstrap_servers: Option<String>,

    /// Path of the sensor to group CSV table.
    #[arg(long, env = "SENSOR_GROUP_FILE")]
    pub sensor_group_file: Option<PathBuf>,
}

impl MqttKafkaConfig {
    /// Apply command line and environment overrides on top of the file.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(address) = &overrides.mqtt_address {
            self.mqtt.address = address.clone();
        }
        if let Some(topic) = &overrides.mqtt_topic {
            self.mqtt.topic = topic.clone();
        }
        if let Some(servers) = &overrides.kafka_bootstrap_servers {
            self.kafka.client.bootstrap_servers = servers.clone();
        }
        if let Some(path) = &overrides.sensor_group_file {
            self.sensor_groups.path = path.clone();
        }
    }
}

impl ServiceConfig for MqttKafkaConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.mqtt.address.is_empty() {
            return Err(ServiceError::validation("mqtt.address cannot be empty"));
        }

        if self.mqtt.topic.is_empty() {
            return Err(ServiceError::validation("mqtt.topic cannot be empty"));
        }

        if self.mqtt.qos > 2 {
            return Err(ServiceError::validation(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                self.mqtt.qos
            )));
        }

        if self.mqtt.payload_key.is_empty() {
            return Err(ServiceError::validation(
                "mqtt.payload_key cannot be empty",
            ));
        }

        if self.mqtt.keepalive_secs < 5 {
            return Err(ServiceError::validation(
                "mqtt.keepalive_secs must be at least 5",
            ));
        }

        if self.mqtt.max_inflight == 0 {
            return Err(ServiceError::validation(
                "mqtt.max_inflight must be greater than zero",
            ));
        }

        if self.kafka.client.bootstrap_servers.is_empty() {
            return Err(ServiceError::validation(
                "kafka.bootstrap_servers cannot be empty",
            ));
        }

        if self.queue.capacity == 0 {
            return Err(ServiceError::validation(
                "queue.capacity must be greater than zero",
            ));
        }

        Ok(())
    }
}
