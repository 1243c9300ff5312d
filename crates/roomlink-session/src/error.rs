//! Error types for the session layer.

/// Errors that can occur in the session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity collaborator could not say who the local player is.
    #[error("identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// The key-value store failed to read or write.
    #[error("storage failed: {0}")]
    Storage(String),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] roomlink_transport::TransportError),

    /// A persisted blob could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] roomlink_protocol::ProtocolError),
}
