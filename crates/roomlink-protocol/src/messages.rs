//! Room wire messages.
//!
//! Three kinds of traffic cross the wire:
//!
//! - [`RoomRequest`]: client → server, always answered by exactly one
//!   [`RoomResponse`].
//! - [`RoomPush`]: server → client, unsolicited (someone joined, the host
//!   changed, a fresh snapshot).
//! - [`Envelope`]: the framing used by stream transports to correlate a
//!   response with the request that caused it.
//!
//! All enums are internally tagged (`{"type": "JoinRoom", ...}`), which
//! keeps the JSON easy to read in logs and easy to build from other
//! languages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PlayerId, PlayerInfo, RoomCode, RoomSnapshot};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Client → server requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomRequest {
    /// Create a room under a client-reserved code.
    CreateRoom { code: RoomCode, max_players: u8 },

    /// Join the room behind `code`.
    JoinRoom { code: RoomCode },

    /// Leave the room. Answered with `Ack`.
    LeaveRoom { code: RoomCode },

    /// Host only: move the room to `Starting`.
    StartGame { code: RoomCode },

    /// Host only: hand host privileges to another member.
    TransferHost { code: RoomCode, target: PlayerId },

    /// Host only: remove a member.
    KickPlayer { code: RoomCode, target: PlayerId },

    /// Toggle the sender's ready flag.
    SetReady { code: RoomCode, ready: bool },

    /// Ask for the authoritative snapshot (with a fresh `sync_version`).
    RequestStateSync { code: RoomCode },
}

impl RoomRequest {
    /// A short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "CreateRoom",
            Self::JoinRoom { .. } => "JoinRoom",
            Self::LeaveRoom { .. } => "LeaveRoom",
            Self::StartGame { .. } => "StartGame",
            Self::TransferHost { .. } => "TransferHost",
            Self::KickPlayer { .. } => "KickPlayer",
            Self::SetReady { .. } => "SetReady",
            Self::RequestStateSync { .. } => "RequestStateSync",
        }
    }

    /// The room the request targets.
    pub fn room_code(&self) -> &RoomCode {
        match self {
            Self::CreateRoom { code, .. }
            | Self::JoinRoom { code }
            | Self::LeaveRoom { code }
            | Self::StartGame { code }
            | Self::TransferHost { code, .. }
            | Self::KickPlayer { code, .. }
            | Self::SetReady { code, .. }
            | Self::RequestStateSync { code } => code,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Why the server refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    RoomNotFound,
    RoomFull,
    /// The proposed code is already taken on the server.
    CodeInUse,
    /// The server has no free codes left.
    CodeSpaceExhausted,
    NotHost,
    InvalidState,
    InvalidRequest,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RoomNotFound => "room not found",
            Self::RoomFull => "room full",
            Self::CodeInUse => "code in use",
            Self::CodeSpaceExhausted => "code space exhausted",
            Self::NotHost => "not host",
            Self::InvalidState => "invalid state",
            Self::InvalidRequest => "invalid request",
        };
        f.write_str(s)
    }
}

/// Server → client answer to a [`RoomRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomResponse {
    /// The request succeeded and the room now looks like this.
    Snapshot { snapshot: RoomSnapshot },
    /// The request succeeded; no state to report.
    Ack,
    /// The request was refused.
    Rejected { reason: RejectReason, message: String },
}

impl RoomResponse {
    pub fn snapshot(snapshot: RoomSnapshot) -> Self {
        Self::Snapshot { snapshot }
    }

    pub fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        Self::Rejected {
            reason,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pushes
// ---------------------------------------------------------------------------

/// Why the server closed a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerCloseReason {
    Expired,
    HostLeft,
    Empty,
    Shutdown,
}

/// Unsolicited server → client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomPush {
    /// A full snapshot, versioned by `snapshot.sync_version`.
    Snapshot { snapshot: RoomSnapshot },
    PlayerJoined { room_code: RoomCode, player: PlayerInfo },
    PlayerLeft { room_code: RoomCode, player_id: PlayerId },
    PlayerUpdated { room_code: RoomCode, player: PlayerInfo },
    HostChanged { room_code: RoomCode, new_host_id: PlayerId },
    RoomClosed { room_code: RoomCode, reason: ServerCloseReason },
}

impl RoomPush {
    /// The room this push is about.
    pub fn room_code(&self) -> &RoomCode {
        match self {
            Self::Snapshot { snapshot } => &snapshot.room_code,
            Self::PlayerJoined { room_code, .. }
            | Self::PlayerLeft { room_code, .. }
            | Self::PlayerUpdated { room_code, .. }
            | Self::HostChanged { room_code, .. }
            | Self::RoomClosed { room_code, .. } => room_code,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope — framing for stream transports
// ---------------------------------------------------------------------------

/// What an envelope carries.
///
/// Adjacently tagged: `{ "type": "Push", "data": { "type": "HostChanged", ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Request(RoomRequest),
    Response(RoomResponse),
    Push(RoomPush),
}

/// The top-level frame on a stream transport.
///
/// ```text
/// ┌────────────────────────────────┐
/// │ seq: 7                         │  ← sender's counter
/// │ reply_to: 3                    │  ← the request this answers
/// │ ┌────────────────────────────┐ │
/// │ │ payload: Response(Ack)     │ │
/// │ └────────────────────────────┘ │
/// └────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Auto-incrementing per sender.
    pub seq: u64,

    /// For responses: the `seq` of the request being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,

    pub payload: Payload,
}
