//! Error types for the persistence service.

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using [`PersistenceError`].
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Transport and setup errors raised by the persistence service.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Kafka client error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Invalid service configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The consumer adapter was shut down and cannot run again.
    #[error("Consumer adapter is stopped")]
    Stopped,

    /// Pipeline contract or record error.
    #[error(transparent)]
    Pipeline(#[from] simpss_common::Error),
}

impl PersistenceError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
