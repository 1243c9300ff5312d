//! WebSocket client transport using `tokio-tungstenite`.
//!
//! One socket carries everything. Outgoing requests are wrapped in an
//! [`Envelope`] with a fresh `seq`; a reader task decodes incoming frames
//! and routes them:
//!
//! ```text
//!   Envelope { reply_to: Some(n), Response } ──► pending[n] (oneshot)
//!   Envelope { Push }                        ──► broadcast to subscribers
//! ```
//!
//! When the socket closes the reader task flips the connection flag to
//! `false` and drops every pending oneshot, so in-flight requests fail
//! with [`TransportError::ConnectionClosed`] instead of hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use roomlink_protocol::{
    Codec, Envelope, JsonCodec, Payload, RoomPush, RoomRequest, RoomResponse,
};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<RoomResponse>>>>;

/// Settings for [`WebSocketTransport`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// How long `send` waits for the matching response.
    pub request_timeout: Duration,
    /// Capacity of the push broadcast channel.
    pub push_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            push_capacity: 256,
        }
    }
}

/// A WebSocket client [`Transport`].
pub struct WebSocketTransport {
    url: String,
    config: WebSocketConfig,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    pending: Pending,
    next_seq: AtomicU64,
    pushes: broadcast::Sender<RoomPush>,
    connected: Arc<watch::Sender<bool>>,
}

impl WebSocketTransport {
    /// A transport for `url` (e.g. `ws://rooms.example.com/ws`).
    /// Nothing is dialled until [`Transport::connect`].
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, WebSocketConfig::default())
    }

    pub fn with_config(url: impl Into<String>, config: WebSocketConfig) -> Self {
        let (pushes, _) = broadcast::channel(config.push_capacity.max(1));
        let (connected, _) = watch::channel(false);
        Self {
            url: url.into(),
            config,
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(1),
            pushes,
            connected: Arc::new(connected),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn reader_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_pending(
    pending: &Pending,
) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<RoomResponse>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn io_error(kind: std::io::ErrorKind, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(kind, e.to_string())
}

/// Decode frames until the socket closes, routing responses and pushes.
async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: Pending,
    pushes: broadcast::Sender<RoomPush>,
    connected: Arc<watch::Sender<bool>>,
) {
    let codec = JsonCodec;
    loop {
        let data: Vec<u8> = match stream.next().await {
            Some(Ok(Message::Binary(data))) => data.into(),
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Close(_))) | None => {
                info!("server closed the connection");
                break;
            }
            Some(Ok(_)) => continue, // ping/pong/frame
            Some(Err(e)) => {
                warn!(error = %e, "websocket read failed");
                break;
            }
        };

        let envelope: Envelope = match codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                continue;
            }
        };

        match envelope.payload {
            Payload::Response(response) => {
                let Some(reply_to) = envelope.reply_to else {
                    warn!(seq = envelope.seq, "response without reply_to");
                    continue;
                };
                match lock_pending(&pending).remove(&reply_to) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!(reply_to, "response for unknown or timed-out request"),
                }
            }
            Payload::Push(push) => {
                let _ = pushes.send(push);
            }
            Payload::Request(request) => {
                warn!(kind = request.kind(), "server sent a request, ignoring");
            }
        }
    }

    connected.send_replace(false);
    // Dropping the senders fails every in-flight request.
    lock_pending(&pending).clear();
}

impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if *self.connected.borrow() {
            return Ok(());
        }

        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(io_error(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;
        let (sink, stream) = ws.split();

        *self.writer.lock().await = Some(sink);
        let task = tokio::spawn(read_loop(
            stream,
            self.pending.clone(),
            self.pushes.clone(),
            self.connected.clone(),
        ));
        if let Some(old) = self.reader_slot().replace(task) {
            old.abort();
        }
        self.connected.send_replace(true);

        info!(url = %self.url, "websocket transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "websocket close handshake failed");
            }
        }
        if let Some(task) = self.reader_slot().take() {
            task.abort();
        }
        lock_pending(&self.pending).clear();
        self.connected.send_replace(false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn send(&self, request: RoomRequest) -> Result<RoomResponse, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let kind = request.kind();
        let bytes = JsonCodec.encode(&Envelope {
            seq,
            reply_to: None,
            payload: Payload::Request(request),
        })?;

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(seq, tx);

        let sent = {
            let mut writer = self.writer.lock().await;
            match writer.as_mut() {
                Some(sink) => sink
                    .send(Message::Binary(bytes.into()))
                    .await
                    .map_err(|e| {
                        TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e))
                    }),
                None => Err(TransportError::NotConnected),
            }
        };
        if let Err(e) = sent {
            lock_pending(&self.pending).remove(&seq);
            return Err(e);
        }

        debug!(seq, kind, "request sent");
        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed(
                "connection dropped before response".into(),
            )),
            Err(_) => {
                lock_pending(&self.pending).remove(&seq);
                warn!(seq, kind, "request timed out");
                Err(TransportError::Timeout)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomPush> {
        self.pushes.subscribe()
    }

    fn watch_connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_slot().take() {
            task.abort();
        }
    }
}
