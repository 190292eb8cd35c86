//! Stream Codec Module
//!
//! JSON encoding of outbound control messages and decoding of inbound
//! frames. Inbound decoding never fails: a frame that is not a JSON document
//! is relayed as raw text.

use serde::Serialize;
use serde_json::Value;

use crate::domain::streaming::UpstreamMessage;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON codec for the market data stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode an inbound text frame.
    ///
    /// Alpaca sends arrays of message objects, but the relay does not care
    /// about the shape: any valid JSON document is forwarded as structured,
    /// including `error` payloads.
    #[must_use]
    pub fn decode(&self, text: &str) -> UpstreamMessage {
        serde_json::from_str::<Value>(text).map_or_else(
            |_| UpstreamMessage::Raw(text.to_string()),
            UpstreamMessage::Structured,
        )
    }

    /// Decode an inbound binary frame, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn decode_bytes(&self, bytes: &[u8]) -> UpstreamMessage {
        self.decode(&String::from_utf8_lossy(bytes))
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test]
    fn decode_trade_array() {
        let codec = JsonCodec::new();
        let text = r#"[{"T":"t","S":"SPY","p":123.45,"s":100}]"#;

        let msg = codec.decode(text);
        assert_eq!(
            msg,
            UpstreamMessage::Structured(json!([{"T": "t", "S": "SPY", "p": 123.45, "s": 100}]))
        );
    }

    #[test]
    fn decode_error_payload_is_still_structured() {
        let codec = JsonCodec::new();
        let msg = codec.decode(r#"[{"T":"error","code":402,"msg":"auth failed"}]"#);
        assert!(msg.is_structured());
    }

    #[test_case("not json" ; "plain text")]
    #[test_case("{\"T\":\"t\"" ; "truncated object")]
    #[test_case("" ; "empty frame")]
    #[test_case("[1,2,]" ; "trailing comma")]
    fn decode_invalid_json_is_raw(text: &str) {
        let codec = JsonCodec::new();
        assert_eq!(codec.decode(text), UpstreamMessage::Raw(text.to_string()));
    }

    #[test_case("42", json!(42) ; "number")]
    #[test_case("\"hello\"", json!("hello") ; "string")]
    #[test_case("null", json!(null) ; "null")]
    #[test_case(" {\"a\":1} ", json!({"a": 1}) ; "surrounding whitespace")]
    fn decode_any_json_document(text: &str, expected: Value) {
        let codec = JsonCodec::new();
        assert_eq!(codec.decode(text), UpstreamMessage::Structured(expected));
    }

    #[test]
    fn decode_bytes_lossy() {
        let codec = JsonCodec::new();
        assert_eq!(
            codec.decode_bytes(br#"{"a":1}"#),
            UpstreamMessage::Structured(json!({"a": 1}))
        );
        assert!(matches!(
            codec.decode_bytes(&[0xff, 0xfe]),
            UpstreamMessage::Raw(_)
        ));
    }

    #[test]
    fn encode_round_trips_key_order() {
        let codec = JsonCodec::new();
        let value = json!({"T": "t", "S": "SPY", "p": 123.5});
        assert_eq!(codec.encode(&value).unwrap(), r#"{"T":"t","S":"SPY","p":123.5}"#);
    }
}
