//! Transport collaborator boundary for Roomlink.
//!
//! The room and matching layers never open sockets. They talk to a
//! [`Transport`]: something that can connect, answer each
//! [`RoomRequest`] with one [`RoomResponse`], and deliver unsolicited
//! [`RoomPush`]es to subscribers.
//!
//! Two implementations ship with the crate:
//!
//! - [`WebSocketTransport`] (feature `websocket`, default): a client over
//!   `tokio-tungstenite` that frames traffic in
//!   [`Envelope`](roomlink_protocol::Envelope)s.
//! - [`MemoryTransport`]: an in-process, scripted transport for tests and
//!   offline play.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::MemoryTransport;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};

use std::future::Future;

use roomlink_protocol::{RoomPush, RoomRequest, RoomResponse};
use tokio::sync::{broadcast, watch};

/// A duplex request/response + push channel to the room server.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static`: one transport is shared (behind an `Arc`)
///   by the room actor and the reconnection task.
/// - Every returned future is `Send` so generic code can `tokio::spawn`
///   work that awaits it.
pub trait Transport: Send + Sync + 'static {
    /// Establish the connection. Succeeds immediately when already
    /// connected.
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the connection. Idempotent.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether the transport currently believes it is connected.
    fn is_connected(&self) -> bool;

    /// Send a request and wait for its response.
    fn send(
        &self,
        request: RoomRequest,
    ) -> impl Future<Output = Result<RoomResponse, TransportError>> + Send;

    /// Receive every push delivered from now on.
    fn subscribe(&self) -> broadcast::Receiver<RoomPush>;

    /// Observe connectivity. The value flips to `false` when the
    /// connection is lost and back to `true` on (re)connect.
    fn watch_connection(&self) -> watch::Receiver<bool>;
}
