//! Kafka to Cassandra persistence for SIMPSS sensor telemetry.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use simpss_common::SensorGroups;
use simpss_persistence::{
    CassandraStore, ConfigOverrides, KafkaStreamSource, PersistenceConfig, PersistenceError,
    attach_sink, build_adapter, topics_for,
};
use simpss_service_framework::{ServiceArgs, ServiceConfig, ServiceRunner, parse_args};

const DEFAULT_CONFIG: &str = "persistence.json5";

/// Kafka to Cassandra persistence for SIMPSS sensor telemetry.
#[derive(Parser, Debug)]
#[command(name = "simpss-persistence")]
#[command(about = "Stores per-group Kafka sensor records in Cassandra")]
#[command(version)]
struct Args {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = parse_args(DEFAULT_CONFIG);

    let mut config = PersistenceConfig::load(&args.service.config)
        .with_context(|| format!("Failed to load config from {:?}", args.service.config))?;
    config.apply_overrides(&args.overrides);
    config.validate().context("Invalid configuration after overrides")?;

    let mut runner =
        ServiceRunner::new_with_args("simpss-persistence", config, Some(&args.service))?;
    info!("Loaded configuration from {:?}", args.service.config);
    let config = runner.config().clone();

    let groups = SensorGroups::from_csv_path(&config.sensor_groups.path).with_context(|| {
        format!(
            "Failed to load sensor groups from {:?}",
            config.sensor_groups.path
        )
    })?;
    let topics = topics_for(&config.kafka, &groups);
    info!(topics = ?topics, "Resolved Kafka topics");

    let store = CassandraStore::connect(&config.cassandra)
        .await
        .context("Failed to connect to Cassandra")?;
    store
        .ensure_keyspace(&config.cassandra.keyspace, config.cassandra.replication_factor)
        .await
        .context("Failed to prepare keyspace")?;

    let source = KafkaStreamSource::new(&config.kafka).context("Failed to create Kafka consumer")?;

    // Table creation blocks on the store, so it runs off the async workers
    let mut adapter = tokio::task::spawn_blocking(move || {
        let mut adapter = build_adapter(source, &config.kafka, &topics)?;
        attach_sink(&mut adapter, store, &config.cassandra)?;
        Ok::<_, PersistenceError>(adapter)
    })
    .await
    .context("Setup task panicked")?
    .context("Failed to set up storage sink")?;

    let stats = adapter.stats_handle();
    let shutdown = runner.shutdown_signal();
    runner.spawn_blocking_with_error("kafka-consume", move || adapter.start_consuming(shutdown));

    runner
        .run_and_report(|| {
            let stats = stats.snapshot();
            info!(
                batches = stats.batches,
                messages = stats.messages,
                transport_errors = stats.transport_errors,
                empty_payloads = stats.empty_payloads,
                decode_errors = stats.decode_errors,
                published = stats.published,
                subscriber_failures = stats.subscriber_failures,
                "Final statistics"
            );
        })
        .await?;

    info!("Persistence stopped");
    Ok(())
}
