use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};
use crate::record::Record;

/// MIME type of the record wire encoding on every hop.
pub const MIME_TYPE: &str = "application/json";

/// Encode a value as UTF-8 JSON.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(Error::from)
}

/// Decode a value from UTF-8 JSON.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(Error::from)
}

/// Decode a wire payload into a [`Record`].
///
/// Any failure (invalid UTF-8, invalid JSON, a non-object document, nested
/// values) is reported as [`Error::Decode`].
pub fn decode_record(data: &[u8]) -> Result<Record> {
    serde_json::from_slice(data).map_err(|e| Error::Decode(e.to_string()))
}

/// Encode a [`Record`] for the wire. Field order is canonical (sorted).
pub fn encode_record(record: &Record) -> Result<Vec<u8>> {
    encode(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn test_encoding_is_canonical() {
        let a = Record::new().with("T", 20).with("id", 121);
        let b = Record::new().with("id", 121).with("T", 20);

        assert_eq!(encode_record(&a).unwrap(), encode_record(&b).unwrap());
        assert_eq!(
            String::from_utf8(encode_record(&a).unwrap()).unwrap(),
            r#"{"T":20,"id":121}"#
        );
    }

    #[test]
    fn test_decode_record_errors() {
        assert!(matches!(decode_record(b"not json"), Err(Error::Decode(_))));
        assert!(matches!(decode_record(b"[1]"), Err(Error::Decode(_))));
        assert!(matches!(decode_record(&[0xff, 0xfe]), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_utf8_text() {
        let record = decode_record("{\"loc\": \"Zürich\"}".as_bytes()).unwrap();
        assert_eq!(record.get("loc"), Some(&FieldValue::Text("Zürich".into())));
    }
}
