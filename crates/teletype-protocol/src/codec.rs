//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The pumps don't care how messages are serialized; they hold something
//! that implements [`Codec`]. [`JsonCodec`] is the only implementation
//! today because browser clients speak JSON.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec value is shared by every
/// connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use teletype_protocol::{Codec, JsonCodec, Message, MessageKind};
///
/// let codec = JsonCodec;
/// let msg: Message = codec.decode(br#"{"type":"JOIN","content":"general"}"#).unwrap();
/// assert_eq!(msg.kind, MessageKind::Join);
/// assert_eq!(msg.content, "general");
///
/// let bytes = codec.encode(&msg).unwrap();
/// assert_eq!(bytes, br#"{"type":"JOIN","content":"general"}"#);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Message, MessageKind};

    #[test]
    fn test_json_decode_malformed_is_decode_error() {
        let result: Result<Message, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_decode_missing_type_is_decode_error() {
        let result: Result<Message, _> =
            JsonCodec.decode(br#"{"content":"hi"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_encode_chat_message() {
        let mut msg = Message::chat("alice", "hi", "general");
        msg.timestamp = None;
        let bytes = JsonCodec.encode(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "CHAT");
        assert_eq!(value["sender"], "alice");
        assert_eq!(value["room"], "general");
        assert_eq!(value["content"], "hi");
        assert!(value.get("timestamp").is_none());
        assert_eq!(msg.kind, MessageKind::Chat);
    }
}
