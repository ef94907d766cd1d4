//! Storage sink: a [`Subscriber`] writing records as table rows.
//!
//! The sink is configured in two steps before it may subscribe:
//!
//! 1. [`StorageSink::set_name_mapping`] fixes the column order.
//! 2. [`StorageSink::ensure_schema`] creates the table and prepares the one
//!    insert statement every row is written with.
//!
//! Each record is remapped, keyed by `<sensor_group>-<time_received>` and
//! bound in the column order fixed at step 1.

use chrono::{DateTime, Utc};
use simpss_common::{
    Error, FieldValue, NameMapping, Publisher, Record, Result, SENSOR_GROUP, Subscriber,
    TIME_RECEIVED, convert, unix_seconds,
};
use tracing::{debug, info};

use crate::store::{BoundValue, ColumnDef, RowStore, TableSchema};

/// Group label used in the row key when a record has none.
pub const FALLBACK_GROUP: &str = "1";

/// Configuration progress of a [`StorageSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Unconfigured,
    MappingSet,
    SchemaReady,
    Receiving,
}

/// Writes each received record as one row through a [`RowStore`].
pub struct StorageSink<S: RowStore> {
    store: S,
    name: String,
    mapping: Option<NameMapping>,
    columns: Vec<String>,
    schema: Option<TableSchema>,
    insert: Option<S::Statement>,
    state: SinkState,
    rows_written: u64,
}

impl<S: RowStore> StorageSink<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            name: String::new(),
            mapping: None,
            columns: Vec::new(),
            schema: None,
            insert: None,
            state: SinkState::Unconfigured,
            rows_written: 0,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Data columns in bind order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Set the column to record field mapping.
    ///
    /// The mapping fixes the insert's parameter order, so it cannot change
    /// once the schema is ready.
    pub fn set_name_mapping(&mut self, mapping: NameMapping) -> Result<()> {
        if matches!(self.state, SinkState::SchemaReady | SinkState::Receiving) {
            return Err(Error::Config(
                "name mapping cannot change once the schema is ready".to_string(),
            ));
        }

        self.columns = mapping.destinations().map(str::to_string).collect();
        self.mapping = Some(mapping);
        self.state = SinkState::MappingSet;
        Ok(())
    }

    /// Create the table if absent and prepare the insert statement.
    ///
    /// Calling it again with the same layout re-runs the idempotent table
    /// creation and keeps the prepared statement. A different layout is
    /// rejected.
    pub fn ensure_schema(
        &mut self,
        table: &str,
        primary_key: ColumnDef,
        columns: &[ColumnDef],
    ) -> Result<()> {
        if self.mapping.is_none() {
            return Err(Error::NotConfigured(
                "name mapping must be set before the schema".to_string(),
            ));
        }

        let schema = TableSchema::new(table, primary_key, columns.to_vec());

        if let Some(existing) = &self.schema {
            if *existing != schema {
                return Err(Error::Config(format!(
                    "table '{}' is already set up with a different layout",
                    existing.table
                )));
            }
            self.store
                .execute_ddl(&schema.create_table_cql())
                .map_err(|e| Error::WriteFailed(e.to_string()))?;
            return Ok(());
        }

        if let Some(missing) = self.columns.iter().find(|c| schema.column(c).is_none()) {
            return Err(Error::Config(format!(
                "mapped column '{}' is not part of table '{}'",
                missing, schema.table
            )));
        }

        self.store
            .execute_ddl(&schema.create_table_cql())
            .map_err(|e| Error::WriteFailed(e.to_string()))?;

        let insert = self
            .store
            .prepare(&schema.insert_cql(&self.columns))
            .map_err(|e| Error::WriteFailed(e.to_string()))?;

        info!(
            table = %schema.table,
            columns = self.columns.len(),
            "Table ready, insert statement prepared"
        );

        self.insert = Some(insert);
        self.schema = Some(schema);
        self.state = SinkState::SchemaReady;
        Ok(())
    }

    /// Remap `record` and write it as one row.
    pub fn insert_row(&mut self, record: &Record) -> Result<()> {
        let (Some(mapping), Some(schema), Some(insert)) =
            (&self.mapping, &self.schema, &self.insert)
        else {
            return Err(Error::NotConfigured(
                "storage sink schema is not ready".to_string(),
            ));
        };

        let converted = convert(record, mapping)?;
        let key = row_key(record);

        let mut values = Vec::with_capacity(self.columns.len() + 1);
        values.push(BoundValue {
            column: schema.primary_key.name.clone(),
            column_type: schema.primary_key.column_type,
            value: Some(FieldValue::Text(key.clone())),
        });
        for column in &self.columns {
            let Some(def) = schema.column(column) else {
                return Err(Error::Config(format!("unknown column '{}'", column)));
            };
            values.push(BoundValue {
                column: column.clone(),
                column_type: def.column_type,
                value: converted.get(column).filter(|v| !v.is_null()).cloned(),
            });
        }

        self.store
            .execute(insert, &values)
            .map_err(|e| Error::WriteFailed(e.to_string()))?;

        debug!(row_key = %key, table = %schema.table, "Row written");
        self.rows_written += 1;
        self.state = SinkState::Receiving;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        matches!(self.state, SinkState::SchemaReady | SinkState::Receiving)
    }
}

/// Row key `<sensor_group>-<time_received>` for `record`, using the current
/// time and [`FALLBACK_GROUP`] for absent fields.
pub fn row_key(record: &Record) -> String {
    row_key_at(record, Utc::now())
}

/// [`row_key`] with an explicit clock reading for the missing-time case.
pub fn row_key_at(record: &Record, now: DateTime<Utc>) -> String {
    let group = match record.get(SENSOR_GROUP) {
        Some(value) if !value.is_null() => value.to_string(),
        _ => FALLBACK_GROUP.to_string(),
    };

    let time = match record.get(TIME_RECEIVED) {
        Some(value) if !value.is_null() => match value.as_timestamp() {
            Some(at) => format!("{:?}", unix_seconds(at)),
            None => value.to_string(),
        },
        _ => format!("{:?}", unix_seconds(now)),
    };

    format!("{}-{}", group, time)
}

impl<S> Subscriber for StorageSink<S>
where
    S: RowStore + 'static,
{
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(self: Box<Self>, publisher: &mut dyn Publisher) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::NotConfigured(
                "storage sink needs a name mapping and a schema before subscribing".to_string(),
            ));
        }
        if self.name.is_empty() {
            return Err(Error::NotConfigured("storage sink has no name".to_string()));
        }

        let name = self.name.clone();
        publisher.add_subscriber(self, &name)
    }

    fn receive(&mut self, record: &Record) -> Result<()> {
        if record.is_empty() {
            return Err(Error::InvalidRecord("record has no fields".to_string()));
        }
        self.insert_row(record)
    }
}
