use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Kafka connection settings shared by producers and consumers.
///
/// Role-specific properties (client id, group id, batching) live in each
/// service's own configuration and are merged through
/// [`properties_with`](Self::properties_with).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,

    /// Session timeout in milliseconds.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Additional librdkafka properties, passed through verbatim.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_session_timeout_ms() -> u64 {
    6000
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            session_timeout_ms: default_session_timeout_ms(),
            extra: BTreeMap::new(),
        }
    }
}

impl KafkaConfig {
    /// Client properties as librdkafka key/value pairs, with role-specific
    /// entries merged in.
    ///
    /// `extra` entries come last so they can override everything else.
    pub fn properties_with(
        &self,
        specific: impl IntoIterator<Item = (String, String)>,
    ) -> Vec<(String, String)> {
        let mut props = vec![
            (
                "bootstrap.servers".to_string(),
                self.bootstrap_servers.clone(),
            ),
            (
                "session.timeout.ms".to_string(),
                self.session_timeout_ms.to_string(),
            ),
        ];
        props.extend(specific);
        props.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        props
    }
}

/// Location of the sensor→group CSV table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorGroupsConfig {
    /// Path to a CSV file with a `sensor_id,group_id` header.
    #[serde(default = "default_sensor_groups_path")]
    pub path: PathBuf,
}

fn default_sensor_groups_path() -> PathBuf {
    PathBuf::from("sensor_group.csv")
}

impl Default for SensorGroupsConfig {
    fn default() -> Self {
        Self {
            path: default_sensor_groups_path(),
        }
    }
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default)]
        kafka: KafkaConfig,
        #[serde(default)]
        logging: LoggingConfig,
        #[serde(default)]
        sensor_groups: SensorGroupsConfig,
    }

    #[test]
    fn test_defaults() {
        let config: Sample = parse_config("{}").unwrap();

        assert_eq!(config.kafka.bootstrap_servers, "localhost:9092");
        assert_eq!(config.kafka.session_timeout_ms, 6000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.sensor_groups.path, PathBuf::from("sensor_group.csv"));
    }

    #[test]
    fn test_kafka_properties_with_extra_last() {
        let config: Sample = parse_config(
            r#"
            {
                kafka: {
                    bootstrap_servers: "k1:9092,k2:9092",
                    extra: { "linger.ms": "5" },
                },
                logging: { level: "debug", format: "json" },
            }
            "#,
        )
        .unwrap();

        let props = config
            .kafka
            .properties_with([("group.id".to_string(), "cg1".to_string())]);
        assert_eq!(props[2], ("group.id".to_string(), "cg1".to_string()));
        assert_eq!(
            props[0],
            ("bootstrap.servers".to_string(), "k1:9092,k2:9092".to_string())
        );
        assert_eq!(
            props.last().unwrap(),
            &("linger.ms".to_string(), "5".to_string())
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
