//! Enrichment of sensor payloads with receipt time and sensor group.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use simpss_common::{
    Error, FieldValue, Record, Result, SENSOR_GROUP, SensorGroups, TIME_RECEIVED, decode_record,
};

/// Turns raw broker payloads into bridge-enriched records.
#[derive(Debug, Clone)]
pub struct Enricher {
    groups: Arc<SensorGroups>,
    payload_key: String,
}

impl Enricher {
    /// Create an enricher looking up sensor ids found under `payload_key`.
    pub fn new(groups: Arc<SensorGroups>, payload_key: impl Into<String>) -> Self {
        Self {
            groups,
            payload_key: payload_key.into(),
        }
    }

    /// Enrich a payload using the current wall-clock time.
    pub fn enrich(&self, payload: &[u8]) -> Result<Record> {
        self.enrich_at(payload, Utc::now())
    }

    /// Enrich a payload with an explicit receipt time.
    ///
    /// Fails with [`Error::Decode`] for malformed payloads and with
    /// [`Error::UnknownSensor`] when the sensor id is missing or unmapped.
    pub fn enrich_at(&self, payload: &[u8], received_at: DateTime<Utc>) -> Result<Record> {
        let mut record = decode_record(payload)?;

        let group = match record.get(&self.payload_key) {
            Some(id) => self
                .groups
                .group_for(id)
                .ok_or_else(|| Error::UnknownSensor(id.to_string()))?,
            None => {
                return Err(Error::UnknownSensor(format!(
                    "no '{}' field in payload",
                    self.payload_key
                )));
            }
        }
        .to_string();

        record.insert(TIME_RECEIVED, FieldValue::Timestamp(received_at));
        record.insert(SENSOR_GROUP, group);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn enricher() -> Enricher {
        let groups = SensorGroups::from_pairs([(120, "g1"), (121, "g1"), (122, "g2")]).unwrap();
        Enricher::new(Arc::new(groups), "id")
    }

    #[test]
    fn test_enrich_mapped_sensor() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let record = enricher().enrich_at(br#"{"id": 121, "T": 20}"#, now).unwrap();

        assert_eq!(record.len(), 4);
        assert_eq!(record.get(SENSOR_GROUP), Some(&FieldValue::from("g1")));
        assert_eq!(record.get(TIME_RECEIVED), Some(&FieldValue::Timestamp(now)));
        assert_eq!(record.get("T"), Some(&FieldValue::Integer(20)));
    }

    #[test]
    fn test_same_sensor_same_group() {
        let enricher = enricher();
        let a = enricher.enrich(br#"{"id": 122}"#).unwrap();
        let b = enricher.enrich(br#"{"id": "122"}"#).unwrap();
        assert_eq!(a.get(SENSOR_GROUP), b.get(SENSOR_GROUP));
    }

    #[test]
    fn test_unmapped_sensor() {
        let result = enricher().enrich(br#"{"id": 999}"#);
        assert!(matches!(result, Err(Error::UnknownSensor(id)) if id == "999"));
    }

    #[test]
    fn test_missing_payload_key() {
        let result = enricher().enrich(br#"{"T": 20}"#);
        assert!(matches!(result, Err(Error::UnknownSensor(_))));
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            enricher().enrich(b"{not json"),
            Err(Error::Decode(_))
        ));
        assert!(matches!(enricher().enrich(b"[1, 2]"), Err(Error::Decode(_))));
    }
}
