//! Static sensor→group table.
//!
//! Loaded once at startup and shared read-only; the group label is the
//! stream topic a sensor's records are routed to.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::record::FieldValue;

/// Immutable mapping from sensor id to group label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorGroups {
    groups: HashMap<i64, String>,
}

#[derive(Debug, Deserialize)]
struct SensorRow {
    sensor_id: Option<String>,
    group_id: Option<String>,
}

impl SensorGroups {
    /// Build a table from `(sensor_id, group)` pairs.
    ///
    /// Fails if a sensor id repeats.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        let mut groups = HashMap::new();
        for (sensor_id, group) in pairs {
            if groups.insert(sensor_id, group.into()).is_some() {
                return Err(Error::Config(format!(
                    "sensor_id {} appears more than once, not allowed",
                    sensor_id
                )));
            }
        }
        Ok(Self { groups })
    }

    /// Load the table from a CSV file with a `sensor_id,group_id` header.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Config(format!(
                "Failed to open sensor file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_csv_reader(file)
    }

    /// Load the table from CSV data with a `sensor_id,group_id` header.
    ///
    /// Every row must carry both values, ids must be integers and must not
    /// repeat. Group labels are trimmed.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut pairs = Vec::new();
        for (line, row) in csv.deserialize::<SensorRow>().enumerate() {
            let row = row?;
            let (Some(sensor_id), Some(group)) = (row.sensor_id, row.group_id) else {
                return Err(Error::Config(format!(
                    "sensor file contains missing values (row {})",
                    line + 1
                )));
            };
            if sensor_id.is_empty() || group.is_empty() {
                return Err(Error::Config(format!(
                    "sensor file contains missing values (row {})",
                    line + 1
                )));
            }
            let sensor_id: i64 = sensor_id.parse().map_err(|_| {
                Error::Config(format!(
                    "sensor_id '{}' is not an integer (row {})",
                    sensor_id,
                    line + 1
                ))
            })?;
            pairs.push((sensor_id, group));
        }

        Self::from_pairs(pairs)
    }

    /// Group label for a sensor id.
    pub fn group_of(&self, sensor_id: i64) -> Option<&str> {
        self.groups.get(&sensor_id).map(String::as_str)
    }

    /// Group label for a sensor id carried in a record field.
    ///
    /// Accepts integers and strings holding an integer.
    pub fn group_for(&self, value: &FieldValue) -> Option<&str> {
        value.as_integer().and_then(|id| self.group_of(id))
    }

    /// Distinct group labels, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.groups
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of sensors in the table.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_csv() {
        let data = "sensor_id,group_id\n120, g1\n121,g1 \n122,g2\n";
        let table = SensorGroups::from_csv_reader(data.as_bytes()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.group_of(120), Some("g1"));
        assert_eq!(table.group_of(121), Some("g1"));
        assert_eq!(table.group_of(122), Some("g2"));
        assert_eq!(table.group_of(999), None);
        assert_eq!(table.groups(), vec!["g1".to_string(), "g2".to_string()]);
    }

    #[test]
    fn test_duplicate_sensor_rejected() {
        let data = "sensor_id,group_id\n120,g1\n120,g2\n";
        assert!(matches!(
            SensorGroups::from_csv_reader(data.as_bytes()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_value_rejected() {
        let data = "sensor_id,group_id\n120,\n";
        assert!(SensorGroups::from_csv_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_non_integer_id_rejected() {
        let data = "sensor_id,group_id\nabc,g1\n";
        assert!(SensorGroups::from_csv_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_group_for_field_value() {
        let table = SensorGroups::from_pairs([(121, "g1")]).unwrap();

        assert_eq!(table.group_for(&FieldValue::Integer(121)), Some("g1"));
        assert_eq!(table.group_for(&FieldValue::Text("121".into())), Some("g1"));
        assert_eq!(table.group_for(&FieldValue::Float(121.5)), None);
        assert_eq!(table.group_for(&FieldValue::Integer(999)), None);
    }

    #[test]
    fn test_from_csv_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sensor_id,group_id").unwrap();
        writeln!(file, "1,north").unwrap();

        let table = SensorGroups::from_csv_path(file.path()).unwrap();
        assert_eq!(table.group_of(1), Some("north"));
    }

    #[test]
    fn test_from_csv_path_missing_file() {
        assert!(matches!(
            SensorGroups::from_csv_path("/nonexistent/sensor_group.csv"),
            Err(Error::Config(_))
        ));
    }
}
