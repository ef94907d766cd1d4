//! Cassandra-backed [`RowStore`] over the scylla driver.

use chrono::{DateTime, NaiveDateTime, Utc};
use scylla::frame::response::result::CqlValue;
use scylla::frame::value::CqlTimestamp;
use scylla::prepared_statement::PreparedStatement;
use scylla::{Session, SessionBuilder};
use simpss_common::FieldValue;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::CassandraConfig;
use crate::store::{BoundValue, ColumnType, RowStore, StoreError};

/// Native protocol port used when an address has none.
const DEFAULT_PORT: u16 = 9042;

/// Session against a Cassandra cluster.
///
/// The driver is async; the [`RowStore`] methods block on the runtime the
/// session was created on, so they must be called from a blocking thread
/// (for example one started with `spawn_blocking`), never from a task.
pub struct CassandraStore {
    session: Session,
    runtime: Handle,
}

impl CassandraStore {
    /// Connect to the configured contact points.
    pub async fn connect(config: &CassandraConfig) -> Result<Self, StoreError> {
        let nodes: Vec<String> = config.addresses.iter().map(|a| with_port(a)).collect();

        info!(nodes = ?nodes, "Connecting to Cassandra");
        let session = SessionBuilder::new()
            .known_nodes(&nodes)
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            session,
            runtime: Handle::current(),
        })
    }

    /// Create `keyspace` if absent and make it the session keyspace.
    pub async fn ensure_keyspace(
        &self,
        keyspace: &str,
        replication_factor: u32,
    ) -> Result<(), StoreError> {
        let cql = format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
             {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
            keyspace, replication_factor
        );
        self.session
            .query(cql, ())
            .await
            .map_err(|e| StoreError::Ddl(e.to_string()))?;

        self.session
            .use_keyspace(keyspace, false)
            .await
            .map_err(|e| StoreError::Ddl(e.to_string()))?;

        info!(keyspace, replication_factor, "Keyspace ready");
        Ok(())
    }
}

impl RowStore for CassandraStore {
    type Statement = PreparedStatement;

    fn execute_ddl(&mut self, cql: &str) -> Result<(), StoreError> {
        debug!(cql, "Executing schema statement");
        self.runtime
            .block_on(self.session.query(cql, ()))
            .map(|_| ())
            .map_err(|e| StoreError::Ddl(e.to_string()))
    }

    fn prepare(&mut self, cql: &str) -> Result<Self::Statement, StoreError> {
        debug!(cql, "Preparing statement");
        self.runtime
            .block_on(self.session.prepare(cql))
            .map_err(|e| StoreError::Prepare(e.to_string()))
    }

    fn execute(
        &mut self,
        statement: &Self::Statement,
        values: &[BoundValue],
    ) -> Result<(), StoreError> {
        let params = values
            .iter()
            .map(|bound| match &bound.value {
                Some(value) => to_cql(bound.column_type, value)
                    .map(Some)
                    .map_err(|reason| StoreError::Conversion {
                        column: bound.column.clone(),
                        reason,
                    }),
                None => Ok(None),
            })
            .collect::<Result<Vec<Option<CqlValue>>, StoreError>>()?;

        self.runtime
            .block_on(self.session.execute(statement, params))
            .map(|_| ())
            .map_err(|e| StoreError::Execute(e.to_string()))
    }
}

fn with_port(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_PORT)
    }
}

/// Coerce a record value to the declared column type.
pub fn to_cql(column_type: ColumnType, value: &FieldValue) -> Result<CqlValue, String> {
    let mismatch = || format!("cannot store {:?} as {}", value, column_type);

    match column_type {
        ColumnType::Text => match value {
            FieldValue::Null => Err(mismatch()),
            other => Ok(CqlValue::Text(other.to_string())),
        },
        ColumnType::Int => {
            let wide = integral(value).ok_or_else(mismatch)?;
            i32::try_from(wide)
                .map(CqlValue::Int)
                .map_err(|_| format!("{} is out of range for int", wide))
        }
        ColumnType::Bigint => integral(value).map(CqlValue::BigInt).ok_or_else(mismatch),
        ColumnType::Float => real(value)
            .map(|v| CqlValue::Float(v as f32))
            .ok_or_else(mismatch),
        ColumnType::Double => real(value).map(CqlValue::Double).ok_or_else(mismatch),
        ColumnType::Boolean => match value {
            FieldValue::Boolean(b) => Ok(CqlValue::Boolean(*b)),
            FieldValue::Text(s) => s
                .trim()
                .parse()
                .map(CqlValue::Boolean)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ColumnType::Timestamp => {
            let at = match value {
                FieldValue::Timestamp(at) => *at,
                FieldValue::Integer(secs) => from_epoch_seconds(*secs as f64).ok_or_else(mismatch)?,
                FieldValue::Float(secs) => from_epoch_seconds(*secs).ok_or_else(mismatch)?,
                FieldValue::Text(s) => parse_timestamp(s).ok_or_else(mismatch)?,
                _ => return Err(mismatch()),
            };
            Ok(CqlValue::Timestamp(CqlTimestamp(at.timestamp_millis())))
        }
    }
}

fn integral(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Integer(i) => Some(*i),
        // i64::MAX as f64 rounds up to 2^63, hence the exclusive bound
        FieldValue::Float(f)
            if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f) =>
        {
            Some(*f as i64)
        }
        FieldValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn real(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Integer(i) => Some(*i as f64),
        FieldValue::Float(f) => Some(*f),
        FieldValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
}

/// Parse an RFC 3339 string, a naive ISO-8601 string (taken as UTC) or
/// epoch seconds.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    text.parse::<f64>().ok().and_then(from_epoch_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_with_port() {
        assert_eq!(with_port("cassandra"), "cassandra:9042");
        assert_eq!(with_port("10.0.0.1:9142"), "10.0.0.1:9142");
    }

    #[test]
    fn test_integer_columns() {
        assert_eq!(
            to_cql(ColumnType::Int, &FieldValue::Integer(-235)),
            Ok(CqlValue::Int(-235))
        );
        assert_eq!(
            to_cql(ColumnType::Int, &FieldValue::Float(918.0)),
            Ok(CqlValue::Int(918))
        );
        assert_eq!(
            to_cql(ColumnType::Bigint, &FieldValue::from("42")),
            Ok(CqlValue::BigInt(42))
        );
        assert!(to_cql(ColumnType::Int, &FieldValue::Integer(i64::MAX)).is_err());
        assert!(to_cql(ColumnType::Int, &FieldValue::Float(1.5)).is_err());
    }

    #[test]
    fn test_bigint_rejects_out_of_range_floats() {
        assert_eq!(
            to_cql(ColumnType::Bigint, &FieldValue::Float(-9_223_372_036_854_775_808.0)),
            Ok(CqlValue::BigInt(i64::MIN))
        );
        assert!(to_cql(ColumnType::Bigint, &FieldValue::Float(1e19)).is_err());
        assert!(to_cql(ColumnType::Bigint, &FieldValue::Float(9_223_372_036_854_775_808.0)).is_err());
        assert!(to_cql(ColumnType::Bigint, &FieldValue::Float(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_text_and_boolean_columns() {
        assert_eq!(
            to_cql(ColumnType::Text, &FieldValue::Integer(2)),
            Ok(CqlValue::Text("2".to_string()))
        );
        assert_eq!(
            to_cql(ColumnType::Boolean, &FieldValue::from("true")),
            Ok(CqlValue::Boolean(true))
        );
        assert!(to_cql(ColumnType::Boolean, &FieldValue::Integer(1)).is_err());
        assert!(to_cql(ColumnType::Text, &FieldValue::Null).is_err());
    }

    #[test]
    fn test_timestamp_column() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        let expected = Ok(CqlValue::Timestamp(CqlTimestamp(1_700_000_000_000)));

        assert_eq!(to_cql(ColumnType::Timestamp, &FieldValue::Timestamp(at)), expected);
        assert_eq!(
            to_cql(ColumnType::Timestamp, &FieldValue::Float(1_700_000_000.0)),
            expected
        );
        assert_eq!(
            to_cql(ColumnType::Timestamp, &FieldValue::Integer(1_700_000_000)),
            expected
        );
        assert!(to_cql(ColumnType::Timestamp, &FieldValue::from("yesterday")).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();

        assert_eq!(parse_timestamp("2023-11-14T22:13:20Z"), Some(at));
        assert_eq!(parse_timestamp("2023-11-14T23:13:20+01:00"), Some(at));
        assert_eq!(parse_timestamp("2023-11-14T22:13:20.000"), Some(at));
        assert_eq!(parse_timestamp("2023-11-14 22:13:20"), Some(at));
        assert_eq!(parse_timestamp("1700000000"), Some(at));
        assert_eq!(parse_timestamp("not a time"), None);
    }
}
