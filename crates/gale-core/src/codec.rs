//! Pluggable text codec for payloads and envelopes.
//!
//! A [`Codec`] converts between `serde_json::Value` trees and text, which
//! keeps the trait object-safe. Typed helpers live on `dyn Codec`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::errors::CodecError;

/// Text serialization used for every payload and every envelope.
pub trait Codec: Send + Sync + 'static {
    /// Short codec name for logs.
    fn name(&self) -> &'static str;

    /// Encode a value tree.
    fn marshal(&self, value: &Value) -> Result<String, CodecError>;

    /// Decode text into a value tree.
    fn unmarshal(&self, text: &str) -> Result<Value, CodecError>;
}

/// JSON codec (the default).
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn marshal(&self, value: &Value) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn unmarshal(&self, text: &str) -> Result<Value, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

impl dyn Codec + '_ {
    /// Encode a handler payload. A value that serializes to `null`
    /// (for example `()`) becomes the empty payload.
    pub fn encode_payload<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CodecError> {
        let tree = serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))?;
        self.encode_value(&tree)
    }

    /// Encode an already-built value tree with the empty-payload rule.
    pub fn encode_value(&self, value: &Value) -> Result<String, CodecError> {
        if value.is_null() {
            return Ok(String::new());
        }
        self.marshal(value)
    }

    /// Decode a payload into a value tree. The empty payload is `null`.
    pub fn decode_value(&self, text: &str) -> Result<Value, CodecError> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        self.unmarshal(text)
    }

    /// Decode a payload into `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self, text: &str) -> Result<T, CodecError> {
        let tree = self.decode_value(text)?;
        serde_json::from_value(tree).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Encode a whole envelope for one frame.
    pub fn encode_envelope(&self, envelope: &Envelope) -> Result<String, CodecError> {
        let tree =
            serde_json::to_value(envelope).map_err(|e| CodecError::Encode(e.to_string()))?;
        self.marshal(&tree)
    }

    /// Decode one frame into an envelope.
    pub fn decode_envelope(&self, text: &str) -> Result<Envelope, CodecError> {
        let tree = self.unmarshal(text)?;
        serde_json::from_value(tree).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageKind;
    use assert_matches::assert_matches;
    use serde::Deserialize;

    fn codec() -> Box<dyn Codec> {
        Box::new(JsonCodec)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Player {
        name: String,
        age: u32,
    }

    #[test]
    fn struct_payload_round_trip() {
        let c = codec();
        let text = c.encode_payload(&Player { name: "ann".into(), age: 7 }).unwrap();
        let back: Player = c.decode_payload(&text).unwrap();
        assert_eq!(back, Player { name: "ann".into(), age: 7 });
    }

    #[test]
    fn unit_encodes_empty() {
        let c = codec();
        assert_eq!(c.encode_payload(&()).unwrap(), "");
    }

    #[test]
    fn empty_decodes_to_null() {
        let c = codec();
        assert_eq!(c.decode_value("").unwrap(), Value::Null);
        let none: Option<Player> = c.decode_payload("").unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn wrong_shape_is_decode_error() {
        let c = codec();
        let err = c.decode_payload::<Player>("\"just a string\"").unwrap_err();
        assert_matches!(err, CodecError::Decode(_));
    }

    #[test]
    fn malformed_envelope_rejected() {
        let c = codec();
        assert!(c.decode_envelope("not json").is_err());
        assert!(c.decode_envelope("{\"id\":\"x\"}").is_err());
    }

    #[test]
    fn envelope_round_trip() {
        let c = codec();
        let env = Envelope::push("/chat", "\"hi\"");
        let text = c.encode_envelope(&env).unwrap();
        let back = c.decode_envelope(&text).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.kind, MessageKind::Push);
    }

    #[test]
    fn codec_name() {
        assert_eq!(JsonCodec.name(), "json");
    }
}
