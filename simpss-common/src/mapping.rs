//! Field-name remapping between naming schemes.
//!
//! A [`NameMapping`] is an explicit one-to-one table from destination key to
//! source key. [`convert`] applies it to a record and refuses to guess when
//! the record and the mapping disagree.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::Record;

/// One-to-one mapping from destination key to source key.
///
/// Entry order is fixed at construction and defines the column order used
/// by storage sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct NameMapping {
    entries: Vec<(String, String)>,
}

impl NameMapping {
    /// Build a mapping from `(destination, source)` pairs.
    ///
    /// Fails with [`Error::Config`] if a destination or a source key appears
    /// twice, since the mapping would no longer be one-to-one.
    pub fn new<I, D, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (D, S)>,
        D: Into<String>,
        S: Into<String>,
    {
        let entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(d, s)| (d.into(), s.into()))
            .collect();

        let mut dests = HashSet::new();
        let mut sources = HashSet::new();
        for (dest, source) in &entries {
            if !dests.insert(dest.as_str()) {
                return Err(Error::Config(format!(
                    "destination key '{}' mapped twice",
                    dest
                )));
            }
            if !sources.insert(source.as_str()) {
                return Err(Error::Config(format!(
                    "source key '{}' mapped twice",
                    source
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(destination, source)` pairs in mapping order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(d, s)| (d.as_str(), s.as_str()))
    }

    /// Destination keys in mapping order.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(d, _)| d.as_str())
    }

    /// Source key feeding a destination key.
    pub fn source_for(&self, dest: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(d, _)| d == dest)
            .map(|(_, s)| s.as_str())
    }
}

impl TryFrom<BTreeMap<String, String>> for NameMapping {
    type Error = Error;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        Self::new(map)
    }
}

impl From<NameMapping> for BTreeMap<String, String> {
    fn from(mapping: NameMapping) -> Self {
        mapping.entries.into_iter().collect()
    }
}

/// Convert `source` into the destination naming scheme.
///
/// Fails with [`Error::ShapeMismatch`] when the record and the mapping have
/// different sizes, and with [`Error::MissingField`] when a mapped source key
/// is absent from the record.
pub fn convert(source: &Record, mapping: &NameMapping) -> Result<Record> {
    if source.len() != mapping.len() {
        return Err(Error::ShapeMismatch {
            mapping: mapping.len(),
            record: source.len(),
        });
    }

    let mut converted = Record::new();
    for (dest, src) in mapping.iter() {
        let value = source
            .get(src)
            .ok_or_else(|| Error::MissingField(src.to_string()))?;
        converted.insert(dest, value.clone());
    }

    Ok(converted)
}
