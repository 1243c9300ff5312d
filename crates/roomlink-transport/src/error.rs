use roomlink_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
///
/// All of these are *transient* from the room layer's point of view:
/// they trigger reconnection or a retried sync rather than a user-facing
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A request was attempted while disconnected.
    #[error("not connected")]
    NotConnected,

    /// Dialing the server failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// No response arrived within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
