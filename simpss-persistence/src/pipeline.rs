//! Wiring of the storage sink onto the consumer adapter.

use simpss_common::{SensorGroups, Subscriber};
use tracing::info;

use crate::config::{CassandraConfig, ConsumerConfig};
use crate::consumer::{StreamConsumerAdapter, StreamSource};
use crate::error::Result;
use crate::sink::StorageSink;
use crate::store::RowStore;

/// Topics to consume: the configured list, or every group of the sensor
/// table.
pub fn topics_for(config: &ConsumerConfig, groups: &SensorGroups) -> Vec<String> {
    match &config.topics {
        Some(topics) => topics.clone(),
        None => groups.groups(),
    }
}

/// Build an adapter over `source`, subscribed to `topics`.
pub fn build_adapter<S: StreamSource>(
    source: S,
    config: &ConsumerConfig,
    topics: &[String],
) -> Result<StreamConsumerAdapter<S>> {
    let mut adapter = StreamConsumerAdapter::new(source, config.batch_size, config.poll_timeout());
    adapter.subscribe_topics(topics)?;
    Ok(adapter)
}

/// Configure a storage sink over `store` and register it with `adapter`.
///
/// Runs the table creation, so with a blocking store it must be called from
/// a blocking thread.
pub fn attach_sink<S, R>(
    adapter: &mut StreamConsumerAdapter<S>,
    store: R,
    config: &CassandraConfig,
) -> Result<()>
where
    S: StreamSource,
    R: RowStore + 'static,
{
    let mut sink = StorageSink::new(store);
    sink.set_name_mapping(config.name_mapping()?)?;
    sink.ensure_schema(&config.table, config.primary_key.clone(), &config.columns)?;
    sink.set_name(&config.subscriber_name);

    Box::new(sink).subscribe(adapter)?;
    info!(
        subscriber = %config.subscriber_name,
        table = %config.table,
        "Storage sink subscribed"
    );
    Ok(())
}
