//! Error types for the MQTT to Kafka bridge.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Transport and setup errors raised by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Request could not be handed to the MQTT client.
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The MQTT network loop failed.
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Kafka client error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Invalid bridge configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record-level pipeline error.
    #[error(transparent)]
    Pipeline(#[from] simpss_common::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
