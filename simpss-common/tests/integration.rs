//! Integration tests for simpss-common library.

use simpss_common::{
    Error, FieldValue, NameMapping, Record, SENSOR_GROUP, SensorGroups, TIME_RECEIVED, convert,
    decode_record, encode_record,
};

/// The storage mapping used by the persistence service by default.
fn storage_mapping() -> NameMapping {
    NameMapping::new([
        ("sensor_group", SENSOR_GROUP),
        ("time_received", TIME_RECEIVED),
        ("sensor_id", "id"),
        ("temperature", "T"),
        ("pressure", "P"),
    ])
    .expect("valid mapping")
}

#[test]
fn test_sensor_payload_through_all_three_schemes() {
    // Sensor scheme, as published on the broker
    let sensor_payload = br#"{"id": 121, "T": 20, "P": 1013}"#;
    let mut record = decode_record(sensor_payload).expect("Decoding failed");
    assert_eq!(record.len(), 3);

    // Bridge-enriched scheme
    let groups = SensorGroups::from_pairs([(120, "g1"), (121, "g1"), (122, "g2")]).unwrap();
    let group = groups
        .group_for(record.get("id").unwrap())
        .expect("sensor is mapped");
    record.insert(SENSOR_GROUP, group);
    record.insert(TIME_RECEIVED, "2024-03-01T10:00:00+00:00");

    // Stream hop keeps the record intact
    let stream_payload = encode_record(&record).expect("Encoding failed");
    let from_stream = decode_record(&stream_payload).expect("Decoding failed");
    assert_eq!(from_stream, record);

    // Storage scheme
    let row = convert(&from_stream, &storage_mapping()).expect("Conversion failed");
    assert_eq!(row.get("sensor_id"), Some(&FieldValue::Integer(121)));
    assert_eq!(row.get("temperature"), Some(&FieldValue::Integer(20)));
    assert_eq!(row.get("sensor_group"), Some(&FieldValue::Text("g1".into())));
    assert_eq!(
        row.get("time_received"),
        Some(&FieldValue::from("2024-03-01T10:00:00+00:00"))
    );
}

#[test]
fn test_stream_hop_keeps_offsets_and_wide_integers() {
    let payload = br#"{"id": 121, "label": "2024-03-01T10:00:00+02:00", "serial": 9223372036854775807}"#;
    let record = decode_record(payload).expect("Decoding failed");

    let again = decode_record(&encode_record(&record).unwrap()).unwrap();
    assert_eq!(again, record);
    assert_eq!(
        again.get("label"),
        Some(&FieldValue::from("2024-03-01T10:00:00+02:00"))
    );
    assert_eq!(again.get("serial"), Some(&FieldValue::Integer(i64::MAX)));

    // Past i64 the value is refused rather than rounded
    assert!(matches!(
        decode_record(br#"{"serial": 18446744073709551615}"#),
        Err(Error::Decode(_))
    ));
}

#[test]
fn test_schema_drift_is_visible() {
    // A sensor firmware update added a humidity field
    let record = Record::new()
        .with("id", 121)
        .with("T", 20)
        .with("P", 1013)
        .with("H", 40)
        .with(SENSOR_GROUP, "g1")
        .with(TIME_RECEIVED, 1.0);

    assert!(matches!(
        convert(&record, &storage_mapping()),
        Err(Error::ShapeMismatch {
            mapping: 5,
            record: 6
        })
    ));
}
