//! Error types for the room layer.
//!
//! Variants fall into the same groups callers care about:
//!
//! - **Validation**: rejected before any network call.
//! - **Policy**: rejected locally from cached counters or permissions.
//! - **Server rejection**: needed a round trip.
//! - **Transient**: transport trouble; recovery runs in the background.
//! - **Start blockers**: reasons the host cannot start the game yet.

use std::time::Duration;

use roomlink_protocol::{PlayerId, ProtocolError, RejectReason, RoomCode, RoomStatus};
use roomlink_session::SessionError;
use roomlink_transport::TransportError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    // -- Validation -------------------------------------------------------
    /// `max_players` outside the allowed range.
    #[error("invalid player count {requested} (allowed {min}..={max})")]
    InvalidPlayerCount { requested: u8, min: u8, max: u8 },

    /// Not a four-digit room code.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// The operation targets a player that is not in the room.
    #[error("player {0} is not in the room")]
    NotAMember(PlayerId),

    /// The operation cannot target the local player.
    #[error("cannot target yourself")]
    TargetIsSelf,

    // -- Policy -----------------------------------------------------------
    /// Too many join attempts in the rate window.
    #[error("too many join attempts, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Too many failed code guesses; joining is locked for a while.
    #[error("joining locked for {remaining:?} after repeated failed codes")]
    SecurityLockout { remaining: Duration },

    /// The local player is not the host.
    #[error("only the host can do this")]
    NotHost,

    /// The local player lacks the named host permission.
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    // -- Server rejection -------------------------------------------------
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// Any other refusal from the server.
    #[error("server rejected request: {reason}: {message}")]
    ServerRejected {
        reason: RejectReason,
        message: String,
    },

    /// The server answered with a response that does not fit the request.
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    /// No free room code could be found within the attempt budget.
    #[error("no free room code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },

    // -- Start blockers ---------------------------------------------------
    #[error("not in a room")]
    NoActiveRoom,

    #[error("room is {0}, not Waiting")]
    WrongStatus(RoomStatus),

    #[error("need {need} players, have {have}")]
    InsufficientPlayers { have: usize, need: usize },

    #[error("room has expired")]
    Expired,

    #[error("not enough energy (cost {cost})")]
    EnergyInsufficient { cost: u32 },

    // -- Transient / plumbing ---------------------------------------------
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session actor has stopped.
    #[error("room session is unavailable")]
    Unavailable,
}
