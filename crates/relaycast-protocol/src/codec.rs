//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec turns envelopes and message bodies into bytes and back. The
//! frame layer ([`crate::frame`]) never looks inside those bytes, so the
//! serialization format can change without touching framing, sessions,
//! or fan-out.
//!
//! Currently we provide [`JsonCodec`]. A compact binary codec can be
//! added later by implementing [`Codec`].

use serde::{de::DeserializeOwned, Serialize};

use crate::{Envelope, Message, PacketBody, PacketType, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// Only [`encode`](Self::encode) and [`decode`](Self::decode) are
/// required. The remaining methods build the envelope-level operations on
/// top of them.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a fresh buffer.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedPayload`] if the bytes are
    /// malformed, truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes an envelope (the contents of one frame).
    fn decode_envelope(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        self.decode(data)
    }

    /// Decodes an envelope payload under the schema selected by `packet_type`.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownType`] if the type has no schema.
    /// - [`ProtocolError::MalformedPayload`] if the bytes don't match it.
    fn decode_body(
        &self,
        packet_type: PacketType,
        data: &[u8],
    ) -> Result<Message, ProtocolError> {
        match packet_type {
            PacketType::Chat => Ok(Message::Chat(self.decode(data)?)),
            PacketType::System => Ok(Message::System(self.decode(data)?)),
            PacketType::Unknown(tag) => Err(ProtocolError::UnknownType(tag)),
        }
    }

    /// Encodes a typed body and wraps it in an envelope with the matching tag.
    fn wrap<M: PacketBody>(&self, body: &M) -> Result<Envelope, ProtocolError> {
        Ok(Envelope {
            packet_type: M::PACKET_TYPE,
            payload: self.encode(body)?,
        })
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use relaycast_protocol::{ChatMessage, Codec, JsonCodec, Message, SessionId};
///
/// let codec = JsonCodec;
/// let chat = ChatMessage { sender_id: SessionId(3), content: "hi".into() };
///
/// let envelope = codec.wrap(&chat).unwrap();
/// let bytes = codec.encode(&envelope).unwrap();
///
/// let decoded = codec.decode_envelope(&bytes).unwrap();
/// let body = codec.decode_body(decoded.packet_type, &decoded.payload).unwrap();
/// assert_eq!(body, Message::Chat(chat));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ChatMessage, SessionId, SystemMessage};

    #[test]
    fn test_wrap_sets_tag_from_body_type() {
        let codec = JsonCodec;
        let env = codec
            .wrap(&SystemMessage {
                text: "welcome".into(),
            })
            .unwrap();
        assert_eq!(env.packet_type, PacketType::System);
    }

    #[test]
    fn test_decode_body_chat() {
        let codec = JsonCodec;
        let payload = br#"{"sender_id": 7, "content": "yo"}"#;
        let msg = codec.decode_body(PacketType::Chat, payload).unwrap();
        assert_eq!(
            msg,
            Message::Chat(ChatMessage {
                sender_id: SessionId(7),
                content: "yo".into(),
            })
        );
    }

    #[test]
    fn test_decode_body_unknown_type_returns_unknown_type() {
        let codec = JsonCodec;
        let result = codec.decode_body(PacketType::Unknown(12), b"{}");
        assert!(matches!(result, Err(ProtocolError::UnknownType(12))));
    }

    #[test]
    fn test_decode_body_wrong_schema_returns_malformed() {
        // A system body under the Chat tag lacks `sender_id`.
        let codec = JsonCodec;
        let result = codec.decode_body(PacketType::Chat, br#"{"text": "x"}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_envelope_garbage_returns_malformed() {
        let codec = JsonCodec;
        let result = codec.decode_envelope(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }
}
