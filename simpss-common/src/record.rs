use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// Field injected by the bridge holding the wall-clock receipt time.
pub const TIME_RECEIVED: &str = "time_received";

/// Field injected by the bridge holding the sensor's group label.
pub const SENSOR_GROUP: &str = "sensor_group";

/// A scalar value carried by a [`Record`] field.
///
/// Wire strings always decode as [`FieldValue::Text`], so a value keeps its
/// exact spelling across hops. Use [`FieldValue::as_timestamp`] to read one as
/// a point in time. Integers outside the `i64` range are rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit JSON `null`.
    Null,

    /// Boolean flag.
    Boolean(bool),

    /// Signed integer.
    Integer(i64),

    /// Floating point number.
    Float(f64),

    /// Point in time, carried on the wire as an RFC 3339 string.
    Timestamp(DateTime<Utc>),

    /// Free text.
    Text(String),
}

impl FieldValue {
    /// Get the value as a string slice if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, parsing text if needed.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a point in time, parsing RFC 3339 text if needed.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(at) => Some(*at),
            FieldValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|at| at.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Whether this is the explicit null value.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a null, boolean, number or string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<FieldValue, E> {
        Ok(FieldValue::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<FieldValue, E> {
        Ok(FieldValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<FieldValue, E> {
        i64::try_from(v)
            .map(FieldValue::Integer)
            .map_err(|_| E::custom(format!("integer {} is out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<FieldValue, E> {
        Ok(FieldValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Integer(i) => write!(f, "{}", i),
            // Debug keeps the trailing ".0" on whole floats.
            FieldValue::Float(v) => write!(f, "{:?}", v),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// A single telemetry reading: field name to scalar value.
///
/// Fields are kept sorted by name, which makes the JSON encoding of a record
/// canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Insert a field, returning the previous value if any.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    /// Get a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Remove a field by name.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Field names in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, FieldValue>> for Record {
    fn from(fields: BTreeMap<String, FieldValue>) -> Self {
        Self { fields }
    }
}

impl IntoIterator for Record {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Seconds since the Unix epoch as a float, with microsecond resolution.
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_builder() {
        let record = Record::new().with("id", 3).with("T", 20.5).with("name", "sensor");

        assert_eq!(record.len(), 3);
        assert_eq!(record.get("id"), Some(&FieldValue::Integer(3)));
        assert_eq!(record.get("T"), Some(&FieldValue::Float(20.5)));
        assert_eq!(record.get("name").and_then(FieldValue::as_str), Some("sensor"));
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn test_value_variants_from_json() {
        let record: Record = serde_json::from_str(
            r#"{"a": null, "b": true, "c": 7, "d": 1.5, "e": "2023-11-14T22:13:20Z", "f": "g1"}"#,
        )
        .unwrap();

        assert_eq!(record.get("a"), Some(&FieldValue::Null));
        assert_eq!(record.get("b"), Some(&FieldValue::Boolean(true)));
        assert_eq!(record.get("c"), Some(&FieldValue::Integer(7)));
        assert_eq!(record.get("d"), Some(&FieldValue::Float(1.5)));
        assert_eq!(
            record.get("e"),
            Some(&FieldValue::Text("2023-11-14T22:13:20Z".to_string()))
        );
        assert_eq!(
            record.get("e").and_then(FieldValue::as_timestamp),
            Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
        );
        assert_eq!(record.get("f"), Some(&FieldValue::Text("g1".to_string())));
    }

    #[test]
    fn test_text_keeps_its_spelling() {
        let json = r#"{"label":"2024-03-01T10:00:00+02:00"}"#;
        let record: Record = serde_json::from_str(json).unwrap();

        assert_eq!(
            record.get("label"),
            Some(&FieldValue::from("2024-03-01T10:00:00+02:00"))
        );
        assert_eq!(serde_json::to_string(&record).unwrap(), json);
        assert_eq!(
            record.get("label").and_then(FieldValue::as_timestamp),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_integer_range() {
        let record: Record = serde_json::from_str(r#"{"serial": 9223372036854775807}"#).unwrap();
        assert_eq!(record.get("serial"), Some(&FieldValue::Integer(i64::MAX)));

        assert!(serde_json::from_str::<Record>(r#"{"serial": 18446744073709551615}"#).is_err());
    }

    #[test]
    fn test_timestamp_travels_as_text() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let json = serde_json::to_string(&Record::new().with("at", at)).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();

        assert!(matches!(back.get("at"), Some(FieldValue::Text(_))));
        assert_eq!(back.get("at").and_then(FieldValue::as_timestamp), Some(at));
    }

    #[test]
    fn test_non_mapping_rejected() {
        assert!(serde_json::from_str::<Record>("[1, 2, 3]").is_err());
        assert!(serde_json::from_str::<Record>("42").is_err());
        assert!(serde_json::from_str::<Record>(r#"{"nested": {"a": 1}}"#).is_err());
    }

    #[test]
    fn test_display_keeps_float_fraction() {
        assert_eq!(FieldValue::Float(1_700_000_000.0).to_string(), "1700000000.0");
        assert_eq!(FieldValue::Integer(-235).to_string(), "-235");
        assert_eq!(FieldValue::Text("g1".into()).to_string(), "g1");
    }

    #[test]
    fn test_as_integer_parses_text() {
        assert_eq!(FieldValue::Text(" 121 ".into()).as_integer(), Some(121));
        assert_eq!(FieldValue::Integer(5).as_integer(), Some(5));
        assert_eq!(FieldValue::Float(5.0).as_integer(), None);
    }

    #[test]
    fn test_unix_seconds() {
        let at = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
        assert_eq!(unix_seconds(at), 1_700_000_000.5);
    }
}
