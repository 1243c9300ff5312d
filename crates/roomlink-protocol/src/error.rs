//! Error types for the protocol layer.
//!
//! Each crate in Roomlink defines its own error enum. A `ProtocolError`
//! always means the problem is in the shape of the data (encoding,
//! decoding, or a snapshot that breaks the room invariants), never in
//! networking or room policy.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a blob
    /// persisted by an older build.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A room code that is not four digits in `1000..=9999`.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// A snapshot that breaks one of the room invariants (host flag,
    /// capacity, duplicate players).
    #[error("room invariant violated: {0}")]
    InvariantViolation(String),
}
