//! Unified error type for Roomlink.

use roomlink_matching::MatchingError;
use roomlink_protocol::ProtocolError;
use roomlink_room::RoomError;
use roomlink_session::SessionError;
use roomlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `roomlink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RoomlinkError {
    /// A transport-level error (connect, send, timeout).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid snapshot).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (identity, storage, reconnect).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (validation, policy, server rejection).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Matching state could not be restored or persisted.
    #[error(transparent)]
    Matching(#[from] MatchingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let roomlink_err: RoomlinkError = err.into();
        assert!(matches!(roomlink_err, RoomlinkError::Transport(_)));
        assert!(roomlink_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let roomlink_err: RoomlinkError = err.into();
        assert!(matches!(roomlink_err, RoomlinkError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::IdentityUnavailable("no account".into());
        let roomlink_err: RoomlinkError = err.into();
        assert!(matches!(roomlink_err, RoomlinkError::Session(_)));
    }

    #[test]
    fn test_from_room_error() {
        let roomlink_err: RoomlinkError = RoomError::NotHost.into();
        assert!(matches!(roomlink_err, RoomlinkError::Room(_)));
        assert_eq!(roomlink_err.to_string(), "only the host can do this");
    }

    #[test]
    fn test_from_matching_error() {
        let err = MatchingError::Storage(SessionError::Storage("disk full".into()));
        let roomlink_err: RoomlinkError = err.into();
        assert!(matches!(roomlink_err, RoomlinkError::Matching(_)));
        assert!(roomlink_err.to_string().contains("disk full"));
    }
}
