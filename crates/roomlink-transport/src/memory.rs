//! In-process scripted transport.
//!
//! [`MemoryTransport`] stands in for the room server: a *responder*
//! closure answers each request, the test injects pushes with
//! [`MemoryTransport::push`], and connectivity is flipped by hand. Every
//! call to `send` is recorded, so a test can assert that a request was
//! (or was not) put on the wire.
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use roomlink_protocol::{RoomCode, RoomRequest, RoomResponse};
//! use roomlink_transport::{MemoryTransport, Transport};
//!
//! let transport = MemoryTransport::with_responder(|_| RoomResponse::Ack);
//! let code = RoomCode::parse("4821").unwrap();
//! let resp = transport.send(RoomRequest::LeaveRoom { code }).await.unwrap();
//! assert_eq!(resp, RoomResponse::Ack);
//! assert_eq!(transport.sent_count(), 1);
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use roomlink_protocol::{RejectReason, RoomPush, RoomRequest, RoomResponse};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::{Transport, TransportError};

type Responder = Box<dyn FnMut(&RoomRequest) -> RoomResponse + Send>;

struct State {
    responder: Responder,
    sent: Vec<RoomRequest>,
    fail_connects: u32,
    fail_sends: u32,
    connect_attempts: u32,
    response_delay: Duration,
}

struct Inner {
    state: Mutex<State>,
    pushes: broadcast::Sender<RoomPush>,
    connected: watch::Sender<bool>,
}

/// A scripted, in-process [`Transport`]. Clones share the same state.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    /// A connected transport that rejects every request.
    pub fn new() -> Self {
        Self::with_responder(|req| {
            RoomResponse::rejected(
                RejectReason::InvalidRequest,
                format!("no responder for {}", req.kind()),
            )
        })
    }

    /// A connected transport answering requests with `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&RoomRequest) -> RoomResponse + Send + 'static,
    {
        let (pushes, _) = broadcast::channel(256);
        let (connected, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    responder: Box::new(responder),
                    sent: Vec::new(),
                    fail_connects: 0,
                    fail_sends: 0,
                    connect_attempts: 0,
                    response_delay: Duration::ZERO,
                }),
                pushes,
                connected,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&RoomRequest) -> RoomResponse + Send + 'static,
    {
        self.state().responder = Box::new(responder);
    }

    /// Deliver a push to every subscriber. Returns the number of receivers.
    pub fn push(&self, push: RoomPush) -> usize {
        self.inner.pushes.send(push).unwrap_or(0)
    }

    /// Every request passed to `send`, oldest first.
    pub fn sent(&self) -> Vec<RoomRequest> {
        self.state().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }

    /// Forget recorded requests.
    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    /// Simulate losing the connection.
    pub fn drop_connection(&self) {
        debug!("memory transport connection dropped");
        self.set_connected(false);
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.send_replace(connected);
    }

    /// Make the next `n` calls to `connect` fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.state().fail_connects = n;
    }

    /// Make the next `n` calls to `send` time out.
    pub fn fail_next_sends(&self, n: u32) {
        self.state().fail_sends = n;
    }

    /// Delay every response by `delay` (Tokio time).
    pub fn set_response_delay(&self, delay: Duration) {
        self.state().response_delay = delay;
    }

    /// How many times `connect` was called.
    pub fn connect_attempts(&self) -> u32 {
        self.state().connect_attempts
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        {
            let mut state = self.state();
            state.connect_attempts += 1;
            if state.fail_connects > 0 {
                state.fail_connects -= 1;
                return Err(TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "scripted connect failure",
                )));
            }
        }
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.set_connected(false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    async fn send(&self, request: RoomRequest) -> Result<RoomResponse, TransportError> {
        let (response, delay) = {
            let mut state = self.state();
            state.sent.push(request.clone());
            if !*self.inner.connected.borrow() {
                return Err(TransportError::NotConnected);
            }
            if state.fail_sends > 0 {
                state.fail_sends -= 1;
                return Err(TransportError::Timeout);
            }
            let response = (state.responder)(&request);
            (response, state.response_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        debug!(kind = request.kind(), "memory transport answered request");
        Ok(response)
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomPush> {
        self.inner.pushes.subscribe()
    }

    fn watch_connection(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }
}
