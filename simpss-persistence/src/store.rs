//! Row store abstraction: table schema, CQL generation and a store trait.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use simpss_common::FieldValue;
use thiserror::Error;

/// Errors reported by a [`RowStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not reach the cluster.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Schema statement failed.
    #[error("schema statement failed: {0}")]
    Ddl(String),

    /// Statement could not be prepared.
    #[error("prepare failed: {0}")]
    Prepare(String),

    /// Bound statement failed to execute.
    #[error("execute failed: {0}")]
    Execute(String),

    /// A value could not be converted to the column type.
    #[error("column '{column}': {reason}")]
    Conversion { column: String, reason: String },
}

/// CQL column types the sink can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Int,
    Bigint,
    Float,
    Double,
    Boolean,
    Timestamp,
}

impl ColumnType {
    /// CQL spelling of the type.
    pub fn as_cql(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Int => "int",
            ColumnType::Bigint => "bigint",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cql())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "varchar" => Ok(ColumnType::Text),
            "int" => Ok(ColumnType::Int),
            "bigint" => Ok(ColumnType::Bigint),
            "float" => Ok(ColumnType::Float),
            "double" => Ok(ColumnType::Double),
            "boolean" => Ok(ColumnType::Boolean),
            "timestamp" => Ok(ColumnType::Timestamp),
            other => Err(format!("unsupported column type '{}'", other)),
        }
    }
}

/// A named, typed table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Table layout: a single-column primary key plus data columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub primary_key: ColumnDef,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, primary_key: ColumnDef, columns: Vec<ColumnDef>) -> Self {
        Self {
            table: table.into(),
            primary_key,
            columns,
        }
    }

    /// Look up a data column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this layout.
    pub fn create_table_cql(&self) -> String {
        let mut cql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} {} PRIMARY KEY",
            self.table, self.primary_key.name, self.primary_key.column_type
        );
        for column in &self.columns {
            cql.push_str(&format!(", {} {}", column.name, column.column_type));
        }
        cql.push(')');
        cql
    }

    /// Parameterized insert of the primary key followed by `columns`, in order.
    pub fn insert_cql<S: AsRef<str>>(&self, columns: &[S]) -> String {
        let names: Vec<&str> = std::iter::once(self.primary_key.name.as_str())
            .chain(columns.iter().map(AsRef::as_ref))
            .collect();
        let markers = vec!["?"; names.len()];

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            names.join(", "),
            markers.join(", ")
        )
    }
}

/// One bound statement parameter. `None` binds an explicit null.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundValue {
    pub column: String,
    pub column_type: ColumnType,
    pub value: Option<FieldValue>,
}

/// Synchronous access to a wide-column store.
///
/// Calls block the current thread until the store answers.
pub trait RowStore: Send {
    /// Handle for a prepared statement.
    type Statement: Send;

    /// Run a schema statement.
    fn execute_ddl(&mut self, cql: &str) -> Result<(), StoreError>;

    /// Prepare a parameterized statement.
    fn prepare(&mut self, cql: &str) -> Result<Self::Statement, StoreError>;

    /// Execute a prepared statement with parameters in marker order.
    fn execute(&mut self, statement: &Self::Statement, values: &[BoundValue])
    -> Result<(), StoreError>;
}

/// Everything a [`MemoryStore`] has been asked to do.
#[derive(Debug, Default)]
pub struct MemoryState {
    /// Schema statements, in order.
    pub ddl: Vec<String>,
    /// Prepared statement texts, in order.
    pub prepared: Vec<String>,
    /// Executed rows as (statement text, parameters).
    pub rows: Vec<(String, Vec<BoundValue>)>,
    /// When set, the next executions fail with this message.
    pub fail_execute: Option<String>,
}

/// In-memory [`RowStore`] that records every call.
///
/// Clones share the same state, so a test can keep one handle while the
/// sink owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following execute fail.
    pub fn fail_executes(&self, message: impl Into<String>) {
        self.state.lock().fail_execute = Some(message.into());
    }

    /// Let executes succeed again.
    pub fn heal(&self) {
        self.state.lock().fail_execute = None;
    }

    pub fn ddl(&self) -> Vec<String> {
        self.state.lock().ddl.clone()
    }

    pub fn prepared(&self) -> Vec<String> {
        self.state.lock().prepared.clone()
    }

    pub fn rows(&self) -> Vec<(String, Vec<BoundValue>)> {
        self.state.lock().rows.clone()
    }
}

impl RowStore for MemoryStore {
    type Statement = String;

    fn execute_ddl(&mut self, cql: &str) -> Result<(), StoreError> {
        self.state.lock().ddl.push(cql.to_string());
        Ok(())
    }

    fn prepare(&mut self, cql: &str) -> Result<Self::Statement, StoreError> {
        self.state.lock().prepared.push(cql.to_string());
        Ok(cql.to_string())
    }

    fn execute(
        &mut self,
        statement: &Self::Statement,
        values: &[BoundValue],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.fail_execute {
            return Err(StoreError::Execute(message.clone()));
        }
        state.rows.push((statement.clone(), values.to_vec()));
        Ok(())
    }
}
