//! Room events for the presentation layer.
//!
//! Everything asynchronous (pushes, conflicts, expiry, slow syncs) is
//! reported here rather than through return values, so UI and audio
//! collaborators can react without blocking the caller.

use std::time::Duration;

use roomlink_protocol::{PlayerId, PlayerInfo, RoomCode, RoomSnapshot, ServerCloseReason};

use crate::{ConflictKind, StartWarning};

/// Why the local client is no longer in a room it did not leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCloseReason {
    /// `expires_at` passed.
    Expired,
    /// The host left and nobody remained to take over.
    NoSuccessor,
    /// The host removed the local player.
    Kicked,
    /// The server closed the room.
    Server(ServerCloseReason),
    /// An authoritative snapshot reported the room `Closed`, or the
    /// server no longer knows it.
    Closed,
}

/// Events raised by the room layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    RoomCreated { snapshot: RoomSnapshot },
    RoomJoined { snapshot: RoomSnapshot },
    RoomLeft { room_code: RoomCode },
    RoomClosed {
        room_code: RoomCode,
        reason: RoomCloseReason,
    },

    /// The local player gained or lost host privileges. All five
    /// permissions flip together.
    HostStatusChanged { is_host: bool },
    HostChanged {
        room_code: RoomCode,
        new_host_id: PlayerId,
    },

    PlayerJoined { player: PlayerInfo },
    PlayerLeft { player_id: PlayerId },
    PlayerUpdated { player: PlayerInfo },

    /// A server snapshot replaced local state.
    SnapshotApplied { version: u64 },
    /// A snapshot at or below the applied version was dropped.
    StaleSnapshotDropped { version: u64, current: u64 },
    /// A snapshot disagreed with unconfirmed local changes. A full
    /// re-sync follows.
    ConflictDetected {
        kind: ConflictKind,
        local_version: u64,
        incoming_version: u64,
    },
    /// A full state sync was requested.
    ResyncRequested,
    /// A sync operation took longer than the performance target.
    PerformanceWarning {
        operation: &'static str,
        elapsed: Duration,
    },
    /// Too many optimistic operations are waiting for confirmation.
    BacklogExceeded { pending: usize },
    /// A sync round trip failed; it will be retried.
    SyncFailed { error: String },

    /// The host passed the start checks; warnings are advisory.
    GameStarting { warnings: Vec<StartWarning> },

    /// The health check saw the transport down.
    ConnectionLost,
    /// Too many failed code guesses locked joining.
    SecurityLockout { duration: Duration },
    /// No free room code left. Terminal until codes are released.
    CodeSpaceExhausted,
}
