//! Room configuration and the local session state machine.

use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use roomlink_protocol::RoomStatus;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for the room layer.
///
/// Every field has a sensible default; override only what you need:
///
/// ```rust
/// use std::time::Duration;
/// use roomlink_room::RoomConfig;
///
/// let config = RoomConfig {
///     join_rate_limit: 3,
///     expiry_check_interval: Duration::from_secs(10),
///     ..Default::default()
/// };
/// assert_eq!(config.min_players, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Minimum players required to start the game.
    pub min_players: u8,

    /// Allowed values for `max_players` when creating a room.
    pub max_players_range: RangeInclusive<u8>,

    /// Join attempts allowed per `join_rate_window`, per identity.
    pub join_rate_limit: u32,
    pub join_rate_window: Duration,

    /// How often the expiry watchdog compares `expires_at` with the clock.
    /// Coarse on purpose: expiry is not gameplay-critical.
    pub expiry_check_interval: Duration,

    /// How often the synchronizer health check runs.
    pub health_check_interval: Duration,

    /// Synchronization operations slower than this raise a
    /// `PerformanceWarning` event.
    pub sync_performance_target: Duration,

    /// How long conflict records are kept before the health check
    /// sweeps them.
    pub conflict_retention: Duration,

    /// Unconfirmed optimistic operations above this count trigger a
    /// `BacklogExceeded` event and a full re-sync.
    pub max_pending_operations: usize,

    /// Fresh codes tried when the server says a code is already taken.
    pub create_code_retries: u32,

    /// Energy costs, checked before the request goes out and consumed
    /// once the server accepts it.
    pub create_cost: u32,
    pub join_cost: u32,
    pub start_cost: u32,

    /// Command channel size for the session actor.
    pub command_buffer: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players_range: 2..=4,
            join_rate_limit: 5,
            join_rate_window: Duration::from_secs(60),
            expiry_check_interval: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(5),
            sync_performance_target: Duration::from_secs(1),
            conflict_retention: Duration::from_secs(5 * 60),
            max_pending_operations: 16,
            create_code_retries: 3,
            create_cost: 1,
            join_cost: 1,
            start_cost: 1,
            command_buffer: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// LocalState
// ---------------------------------------------------------------------------

/// Where the local client is in the room lifecycle.
///
/// ```text
/// NoRoom → Creating → Hosting(Waiting) → Hosting(Starting) → NoRoom
/// NoRoom → Joining  → Participating(Waiting) → Participating(Starting) → NoRoom
/// ```
///
/// Any state may drop back to `NoRoom` on leave, expiry, or a forced
/// close. A host transfer moves `Hosting(s)` ↔ `Participating(s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalState {
    #[default]
    NoRoom,
    /// A create request is in flight.
    Creating,
    /// A join request is in flight.
    Joining,
    /// In a room as its host.
    Hosting(RoomStatus),
    /// In a room as a regular member.
    Participating(RoomStatus),
}

impl LocalState {
    /// The in-room state for `status`, hosting or not.
    pub fn in_room(is_host: bool, status: RoomStatus) -> Self {
        if is_host {
            Self::Hosting(status)
        } else {
            Self::Participating(status)
        }
    }

    pub fn is_in_room(self) -> bool {
        matches!(self, Self::Hosting(_) | Self::Participating(_))
    }

    pub fn is_hosting(self) -> bool {
        matches!(self, Self::Hosting(_))
    }

    /// The room status, when in a room.
    pub fn status(self) -> Option<RoomStatus> {
        match self {
            Self::Hosting(s) | Self::Participating(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for LocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoom => write!(f, "NoRoom"),
            Self::Creating => write!(f, "Creating"),
            Self::Joining => write!(f, "Joining"),
            Self::Hosting(s) => write!(f, "Hosting({s})"),
            Self::Participating(s) => write!(f, "Participating({s})"),
        }
    }
}
