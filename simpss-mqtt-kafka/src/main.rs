//! MQTT to Kafka bridge for SIMPSS sensor telemetry.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use simpss_common::SensorGroups;
use simpss_mqtt_kafka::{ConfigOverrides, MqttKafkaBridge, MqttKafkaConfig};
use simpss_service_framework::{ServiceArgs, ServiceConfig, ServiceRunner, parse_args};

const DEFAULT_CONFIG: &str = "mqtt-kafka.json5";

/// MQTT to Kafka bridge for SIMPSS sensor telemetry.
#[derive(Parser, Debug)]
#[command(name = "simpss-mqtt-kafka")]
#[command(about = "Forwards MQTT sensor readings to per-group Kafka topics")]
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

    // Load configuration, then apply deployment overrides
    let mut config = MqttKafkaConfig::load(&args.service.config)
        .with_context(|| format!("Failed to load config from {:?}", args.service.config))?;
    config.apply_overrides(&args.overrides);
    config.validate().context("Invalid configuration after overrides")?;

    let mut runner = ServiceRunner::new_with_args("simpss-mqtt-kafka", config, Some(&args.service))?;
    info!("Loaded configuration from {:?}", args.service.config);

    // Sensor table is loaded once and shared read-only
    let groups_path = runner.config().sensor_groups.path.clone();
    let groups = SensorGroups::from_csv_path(&groups_path)
        .with_context(|| format!("Failed to load sensor groups from {:?}", groups_path))?;
    info!(
        sensors = groups.len(),
        groups = ?groups.groups(),
        "Loaded sensor groups"
    );

    let bridge = MqttKafkaBridge::new(runner.config().clone(), Arc::new(groups));
    bridge
        .spawn(&mut runner)
        .context("Failed to start bridge")?;

    runner
        .run_and_report(|| {
            let stats = bridge.stats();
            info!(
                received = stats.received,
                decode_errors = stats.decode_errors,
                unknown_sensor = stats.unknown_sensor,
                enqueued = stats.enqueued,
                dropped = stats.dropped,
                dispatched = stats.dispatched,
                produce_failed = stats.produce_failed,
                delivered = stats.delivered,
                delivery_failed = stats.delivery_failed,
                "Final statistics"
            );
        })
        .await?;

    info!("Bridge stopped");
    Ok(())
}
