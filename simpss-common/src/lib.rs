//! SIMPSS Common Library
//!
//! Shared types and utilities for the SIMPSS telemetry pipeline
//! (MQTT → Kafka → Cassandra):
//!
//! - [`record`] - Telemetry record model (`Record`, `FieldValue`)
//! - [`serialization`] - JSON wire encoding of records
//! - [`mapping`] - Field-name remapping between naming schemes
//! - [`pubsub`] - Publisher/Subscriber contract and a reusable registry
//! - [`sensor_groups`] - Static sensor→group table
//! - [`config`] - Shared configuration types (JSON5 format)
//! - [`error`] - Error taxonomy

pub mod config;
pub mod error;
pub mod mapping;
pub mod pubsub;
pub mod record;
pub mod sensor_groups;
pub mod serialization;

// Re-export commonly used types at the crate root
pub use config::{KafkaConfig, LogFormat, LoggingConfig, SensorGroupsConfig, parse_config};
pub use error::{Error, Result};
pub use mapping::{NameMapping, convert};
pub use pubsub::{PublishReport, Publisher, Subscriber, SubscriberRegistry};
pub use record::{FieldValue, Record, SENSOR_GROUP, TIME_RECEIVED, unix_seconds};
pub use sensor_groups::SensorGroups;
pub use serialization::{decode, decode_record, encode, encode_record};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use simpss_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
