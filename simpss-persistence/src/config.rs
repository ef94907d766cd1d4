//! Configuration for the persistence service.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simpss_common::NameMapping;
use simpss_service_framework::{
    KafkaConfig, LoggingConfig, SensorGroupsConfig, ServiceConfig, ServiceError,
};

use crate::store::{ColumnDef, ColumnType, TableSchema};

/// Storage mapping used when none is configured, as (column, record field).
const DEFAULT_MAPPING: [(&str, &str); 11] = [
    ("sensor_group", "sensor_group"),
    ("time_received", "time_received"),
    ("sensor_id", "id"),
    ("uptime", "uptime"),
    ("temperature", "T"),
    ("pressure", "P"),
    ("humidity", "H"),
    ("ix", "Ix"),
    ("iy", "Iy"),
    ("iz", "Iz"),
    ("mask", "M"),
];

/// Complete persistence service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Kafka consumer settings
    #[serde(default)]
    pub kafka: ConsumerConfig,

    /// Cassandra cluster and table settings
    #[serde(default)]
    pub cassandra: CassandraConfig,

    /// Sensor to group table, used for the default topic list
    #[serde(default)]
    pub sensor_groups: SensorGroupsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Kafka consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Shared connection settings
    #[serde(flatten)]
    pub client: KafkaConfig,

    /// Consumer group (default: "cg1")
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Optional client id reported to the brokers
    #[serde(default)]
    pub client_id: Option<String>,

    /// Commit offsets automatically (default: true)
    #[serde(default = "default_enable_auto_commit")]
    pub enable_auto_commit: bool,

    /// Maximum messages per poll (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum wait for one batch in milliseconds (default: 1000)
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Topics to consume (default: every group of the sensor table)
    #[serde(default)]
    pub topics: Option<Vec<String>>,
}

fn default_group_id() -> String {
    "cg1".to_string()
}

fn default_enable_auto_commit() -> bool {
    true
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            client: KafkaConfig::default(),
            group_id: default_group_id(),
            client_id: None,
            enable_auto_commit: default_enable_auto_commit(),
            batch_size: default_batch_size(),
            poll_timeout_ms: default_poll_timeout_ms(),
            topics: None,
        }
    }
}

impl ConsumerConfig {
    /// Consumer properties as librdkafka key/value pairs.
    pub fn properties(&self) -> Vec<(String, String)> {
        let mut specific = vec![
            ("group.id".to_string(), self.group_id.clone()),
            (
                "enable.auto.commit".to_string(),
                self.enable_auto_commit.to_string(),
            ),
        ];
        if let Some(client_id) = &self.client_id {
            specific.push(("client.id".to_string(), client_id.clone()));
        }
        self.client.properties_with(specific)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Cassandra cluster, keyspace and table layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CassandraConfig {
    /// Contact points, `host` or `host:port` (default: ["localhost"])
    #[serde(default = "default_addresses")]
    pub addresses: Vec<String>,

    /// Keyspace, created if absent (default: "simpss")
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    /// SimpleStrategy replication factor (default: 3)
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,

    /// Target table (default: "sensor_data")
    #[serde(default = "default_table")]
    pub table: String,

    /// Primary key column (default: row_key text)
    #[serde(default = "default_primary_key")]
    pub primary_key: ColumnDef,

    /// Data columns
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnDef>,

    /// Column to record field mapping (default: the sensor reading layout)
    #[serde(default)]
    pub mapping: Option<NameMapping>,

    /// Name the storage sink registers under (default: "sub-1")
    #[serde(default = "default_subscriber_name")]
    pub subscriber_name: String,
}

fn default_addresses() -> Vec<String> {
    vec!["localhost".to_string()]
}

fn default_keyspace() -> String {
    "simpss".to_string()
}

fn default_replication_factor() -> u32 {
    3
}

fn default_table() -> String {
    "sensor_data".to_string()
}

fn default_primary_key() -> ColumnDef {
    ColumnDef::new("row_key", ColumnType::Text)
}

fn default_columns() -> Vec<ColumnDef> {
    let mut columns = vec![
        ColumnDef::new("time_received", ColumnType::Timestamp),
        ColumnDef::new("sensor_group", ColumnType::Text),
    ];
    columns.extend(
        [
            "sensor_id",
            "uptime",
            "temperature",
            "pressure",
            "humidity",
            "ix",
            "iy",
            "iz",
            "mask",
        ]
        .into_iter()
        .map(|name| ColumnDef::new(name, ColumnType::Int)),
    );
    columns
}

fn default_subscriber_name() -> String {
    "sub-1".to_string()
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            addresses: default_addresses(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
            table: default_table(),
            primary_key: default_primary_key(),
            columns: default_columns(),
            mapping: None,
            subscriber_name: default_subscriber_name(),
        }
    }
}

impl CassandraConfig {
    /// The configured storage mapping, or the sensor reading layout.
    pub fn name_mapping(&self) -> simpss_common::Result<NameMapping> {
        match &self.mapping {
            Some(mapping) => Ok(mapping.clone()),
            None => NameMapping::new(DEFAULT_MAPPING),
        }
    }

    /// Table layout described by this configuration.
    pub fn schema(&self) -> TableSchema {
        TableSchema::new(
            self.table.clone(),
            self.primary_key.clone(),
            self.columns.clone(),
        )
    }
}

/// Deployment overrides read from the command line or the environment.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Kafka bootstrap servers.
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS")]
    pub kafka_bootstrap_servers: Option<String>,

    /// Cassandra contact points, separated by ';'.
    #[arg(long, env = "CASSANDRA_CLUSTER_ADDRESSES", value_delimiter = ';')]
    pub cassandra_addresses: Option<Vec<String>>,

    /// Cassandra keyspace.
    #[arg(long, env = "CASSANDRA_KEYSPACE")]
    pub cassandra_keyspace: Option<String>,

    /// Keyspace replication factor.
    #[arg(long, env = "CASSANDRA_REPLICATION")]
    pub cassandra_replication: Option<u32>,

    /// Path of the sensor to group CSV table.
    #[arg(long, env = "SENSOR_GROUP_FILE")]
    pub sensor_group_file: Option<PathBuf>,
}

impl PersistenceConfig {
    /// Apply command line and environment overrides on top of the file.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(servers) = &overrides.kafka_bootstrap_servers {
            self.kafka.client.bootstrap_servers = servers.clone();
        }
        if let Some(addresses) = &overrides.cassandra_addresses {
            self.cassandra.addresses = addresses
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
        }
        if let Some(keyspace) = &overrides.cassandra_keyspace {
            self.cassandra.keyspace = keyspace.clone();
        }
        if let Some(replication) = overrides.cassandra_replication {
            self.cassandra.replication_factor = replication;
        }
        if let Some(path) = &overrides.sensor_group_file {
            self.sensor_groups.path = path.clone();
        }
    }
}

impl ServiceConfig for PersistenceConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.kafka.client.bootstrap_servers.is_empty() {
            return Err(ServiceError::validation(
                "kafka.bootstrap_servers cannot be empty",
            ));
        }

        if self.kafka.batch_size == 0 {
            return Err(ServiceError::validation(
                "kafka.batch_size must be greater than zero",
            ));
        }

        if let Some(topics) = &self.kafka.topics
            && topics.iter().any(String::is_empty)
        {
            return Err(ServiceError::validation("kafka.topics cannot hold empty names"));
        }

        let cassandra = &self.cassandra;
        if cassandra.addresses.is_empty() {
            return Err(ServiceError::validation(
                "cassandra.addresses cannot be empty",
            ));
        }

        if cassandra.keyspace.is_empty() || cassandra.table.is_empty() {
            return Err(ServiceError::validation(
                "cassandra.keyspace and cassandra.table cannot be empty",
            ));
        }

        if cassandra.replication_factor == 0 {
            return Err(ServiceError::validation(
                "cassandra.replication_factor must be greater than zero",
            ));
        }

        let mut declared = HashSet::new();
        for column in &cassandra.columns {
            if column.name == cassandra.primary_key.name {
                return Err(ServiceError::validation(format!(
                    "column '{}' is already the primary key",
                    column.name
                )));
            }
            if !declared.insert(column.name.as_str()) {
                return Err(ServiceError::validation(format!(
                    "column '{}' declared twice",
                    column.name
                )));
            }
        }

        let mapping = cassandra
            .name_mapping()
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        if mapping.is_empty() {
            return Err(ServiceError::validation("cassandra.mapping cannot be empty"));
        }
        if let Some(column) = mapping.destinations().find(|d| !declared.contains(d)) {
            return Err(ServiceError::validation(format!(
                "mapped column '{}' is not declared in cassandra.columns",
                column
            )));
        }

        if cassandra.subscriber_name.is_empty() {
            return Err(ServiceError::validation(
                "cassandra.subscriber_name cannot be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PersistenceConfig::from_json5("{}").unwrap();

        assert_eq!(config.kafka.group_id, "cg1");
        assert_eq!(config.kafka.batch_size, 10);
        assert_eq!(config.kafka.poll_timeout(), Duration::from_secs(1));
        assert!(config.kafka.enable_auto_commit);
        assert!(config.kafka.topics.is_none());
        assert_eq!(config.cassandra.addresses, vec!["localhost".to_string()]);
        assert_eq!(config.cassandra.keyspace, "simpss");
        assert_eq!(config.cassandra.replication_factor, 3);
        assert_eq!(config.cassandra.subscriber_name, "sub-1");

        let mapping = config.cassandra.name_mapping().unwrap();
        assert_eq!(mapping.len(), 11);
        assert_eq!(mapping.source_for("temperature"), Some("T"));
        assert_eq!(mapping.source_for("sensor_id"), Some("id"));
    }

    #[test]
    fn test_consumer_properties() {
        let config = PersistenceConfig::from_json5(
            r#"{ kafka: { group_id: "archive", client_id: "p1" } }"#,
        )
        .unwrap();

        let props = config.kafka.properties();
        assert!(props.contains(&("group.id".to_string(), "archive".to_string())));
        assert!(props.contains(&("enable.auto.commit".to_string(), "true".to_string())));
        assert!(props.contains(&("client.id".to_string(), "p1".to_string())));
        assert_eq!(props[0].0, "bootstrap.servers");
    }

    #[test]
    fn test_custom_layout() {
        let config = PersistenceConfig::from_json5(
            r#"
            {
                cassandra: {
                    table: "readings",
                    primary_key: { name: "k", type: "text" },
                    columns: [
                        { name: "t", type: "double" },
                        { name: "grp", type: "text" },
                    ],
                    mapping: { t: "T", grp: "sensor_group" },
                },
            }
            "#,
        )
        .unwrap();

        let schema = config.cassandra.schema();
        assert_eq!(schema.table, "readings");
        assert_eq!(schema.column("t").unwrap().column_type, ColumnType::Double);
        assert_eq!(config.cassandra.name_mapping().unwrap().len(), 2);
    }

    #[test]
    fn test_validation_rejects_undeclared_column() {
        let result = PersistenceConfig::from_json5(
            r#"{ cassandra: { columns: [{ name: "t", type: "int" }], mapping: { x: "T" } } }"#,
        );
        assert!(matches!(result, Err(ServiceError::ConfigValidation(_))));
    }

    #[test]
    fn test_validation_rejects_primary_key_as_column() {
        let result = PersistenceConfig::from_json5(
            r#"{ cassandra: { columns: [{ name: "row_key", type: "text" }], mapping: { row_key: "id" } } }"#,
        );
        assert!(matches!(result, Err(ServiceError::ConfigValidation(_))));
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let result = PersistenceConfig::from_json5("{ kafka: { batch_size: 0 } }");
        assert!(matches!(result, Err(ServiceError::ConfigValidation(_))));
    }

    #[test]
    fn test_overrides() {
        let mut config = PersistenceConfig::default();
        config.apply_overrides(&ConfigOverrides {
            cassandra_addresses: Some(vec!["c1".to_string(), " c2:9042 ".to_string()]),
            cassandra_replication: Some(1),
            ..Default::default()
        });

        assert_eq!(
            config.cassandra.addresses,
            vec!["c1".to_string(), "c2:9042".to_string()]
        );
        assert_eq!(config.cassandra.replication_factor, 1);
        assert_eq!(config.cassandra.keyspace, "simpss");
    }
}
