//! Kafka to Cassandra persistence for SIMPSS sensor telemetry.
//!
//! A [`StreamConsumerAdapter`] polls the per-group Kafka topics in small
//! batches and publishes each decoded record to its subscribers. The
//! [`StorageSink`] subscriber remaps the record to the table's column names
//! and writes it with one prepared insert.
//!
//! # Row layout
//!
//! ```text
//! {"sensor_group": "g1", "time_received": ..., "id": 121, "T": 20}
//!   ──► row_key = "g1-<time_received>", sensor_id = 121, temperature = 20
//! ```
//!
//! Transport errors and undecodable messages are skipped. Store failures
//! are reported per record and never stop consumption.

pub mod cassandra;
pub mod config;
pub mod consumer;
pub mod error;
pub mod kafka;
pub mod pipeline;
pub mod sink;
pub mod stats;
pub mod store;

pub use cassandra::CassandraStore;
pub use config::{CassandraConfig, ConfigOverrides, ConsumerConfig, PersistenceConfig};
pub use consumer::{AdapterState, StreamConsumerAdapter, StreamMessage, StreamSource};
pub use error::{PersistenceError, Result};
pub use kafka::KafkaStreamSource;
pub use pipeline::{attach_sink, build_adapter, topics_for};
pub use sink::{FALLBACK_GROUP, SinkState, StorageSink, row_key};
pub use stats::{ConsumerStats, SharedStats};
pub use store::{BoundValue, ColumnDef, ColumnType, MemoryStore, RowStore, StoreError, TableSchema};
