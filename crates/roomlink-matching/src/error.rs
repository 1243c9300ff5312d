//! Error types for the matching layer.

use roomlink_protocol::ProtocolError;
use roomlink_session::SessionError;

/// Errors from persisting or restoring matching state.
///
/// Illegal transitions are not errors: they return `false` and raise a
/// `TransitionFailed` event.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    /// The key-value store failed.
    #[error("matching state storage failed: {0}")]
    Storage(#[from] SessionError),

    /// The persisted blob could not be encoded or decoded.
    #[error("matching state encoding failed: {0}")]
    Encoding(#[from] ProtocolError),
}
