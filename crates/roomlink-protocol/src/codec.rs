//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between Rust types and raw bytes. Two places need one:
//! the stream transport (envelopes on the socket) and local persistence
//! (the matching state and the room code table are stored as opaque blobs
//! in a key-value store). Both go through the [`Codec`] trait so the
//! format can be swapped in one place.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `encode` accepts any `T: Serialize`; `decode` produces any
/// `T: DeserializeOwned`, i.e. a value that owns its data and does not
/// borrow from the input buffer.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type (for example a blob written by an
    /// older build).
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable on the wire and in the key-value store, which makes
/// stale persisted state easy to inspect. Behind the `json` feature
/// (enabled by default).
///
/// ## Example
///
/// ```rust
/// use roomlink_protocol::{Codec, Envelope, JsonCodec, Payload, RoomCode, RoomRequest};
///
/// let codec = JsonCodec;
///
/// let envelope = Envelope {
///     seq: 1,
///     reply_to: None,
///     payload: Payload::Request(RoomRequest::JoinRoom {
///         code: RoomCode::parse("4821").unwrap(),
///     }),
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{PlayerId, PlayerInfo, RoomCode, RoomSnapshot};

    #[test]
    fn test_json_codec_snapshot_survives_encoding() {
        let mut room = RoomSnapshot::new(
            RoomCode::parse("5173").unwrap(),
            PlayerInfo::new(PlayerId(1), "ana"),
            3,
            10,
            20,
        );
        room.add_player(PlayerInfo::new(PlayerId(2), "bo")).unwrap();
        room.sync_version = 12;

        let bytes = JsonCodec.encode(&room).unwrap();
        let decoded: RoomSnapshot = JsonCodec.decode(&bytes).unwrap();

        assert_eq!(decoded, room);
        decoded.check_invariants().unwrap();
    }

    #[test]
    fn test_json_codec_decode_garbage_returns_decode_error() {
        let result: Result<RoomSnapshot, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
