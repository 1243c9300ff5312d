//! Matching states, the transition table, and the persisted session state.

use std::fmt;
use std::time::Duration;

use roomlink_protocol::{PlayerId, RoomCode};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MatchState
// ---------------------------------------------------------------------------

/// Where matching is.
///
/// ```text
/// Idle      -> Searching
/// Searching -> Found | Cancelled | Failed
/// Found     -> Starting | Cancelled | Failed
/// Starting  -> Idle | Failed
/// Cancelled -> Idle
/// Failed    -> Idle | Searching
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchState {
    #[default]
    Idle,
    Searching,
    Found,
    Starting,
    Cancelled,
    Failed,
}

impl MatchState {
    pub const ALL: [MatchState; 6] = [
        Self::Idle,
        Self::Searching,
        Self::Found,
        Self::Starting,
        Self::Cancelled,
        Self::Failed,
    ];

    /// Whether `self -> target` is in the transition table.
    pub fn can_transition_to(self, target: Self) -> bool {
        use MatchState::*;
        matches!(
            (self, target),
            (Idle, Searching)
                | (Searching, Found | Cancelled | Failed)
                | (Found, Starting | Cancelled | Failed)
                | (Starting, Idle | Failed)
                | (Cancelled, Idle)
                | (Failed, Idle | Searching)
        )
    }

    /// States that only mean something with a live connection. They are
    /// never trusted after a restart.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Searching | Self::Found | Self::Starting)
    }

    /// Reason recorded when this state's timeout fires.
    pub fn timeout_reason(self) -> Option<&'static str> {
        match self {
            Self::Searching => Some("Search timeout"),
            Self::Found => Some("Found timeout"),
            Self::Starting => Some("Start timeout"),
            _ => None,
        }
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Game mode and match type
// ---------------------------------------------------------------------------

/// Selected game mode. Drives the estimated wait shown while searching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Quick,
    Classic,
    Party,
}

impl GameMode {
    pub fn estimated_wait(self) -> Duration {
        match self {
            Self::Quick => Duration::from_secs(15),
            Self::Classic => Duration::from_secs(30),
            Self::Party => Duration::from_secs(45),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchType {
    #[default]
    QuickMatch,
    PrivateRoom,
}

// ---------------------------------------------------------------------------
// MatchingSessionState
// ---------------------------------------------------------------------------

/// Everything matching knows about the current attempt. Persisted on
/// every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingSessionState {
    pub current_state: MatchState,
    /// Unix milliseconds when the current search began.
    pub search_start_time: Option<u64>,
    pub estimated_wait_time: Option<Duration>,
    /// In arrival order.
    pub matched_players: Vec<PlayerId>,
    pub current_room_code: Option<RoomCode>,
    pub last_error_message: Option<String>,
    pub selected_game_mode: GameMode,
    pub match_type: MatchType,
    pub selected_player_count: u8,
}

impl Default for MatchingSessionState {
    fn default() -> Self {
        Self {
            current_state: MatchState::Idle,
            search_start_time: None,
            estimated_wait_time: None,
            matched_players: Vec::new(),
            current_room_code: None,
            last_error_message: None,
            selected_game_mode: GameMode::default(),
            match_type: MatchType::default(),
            selected_player_count: 2,
        }
    }
}

impl MatchingSessionState {
    /// Update state-scoped fields on entering `target`.
    pub(crate) fn enter(&mut self, target: MatchState, now_ms: u64, reason: Option<&str>) {
        match target {
            MatchState::Idle => {
                self.matched_players.clear();
                self.current_room_code = None;
                self.search_start_time = None;
                self.estimated_wait_time = None;
            }
            MatchState::Searching => {
                self.search_start_time = Some(now_ms);
                self.estimated_wait_time = Some(self.selected_game_mode.estimated_wait());
                self.matched_players.clear();
                self.current_room_code = None;
                self.last_error_message = None;
            }
            MatchState::Failed => {
                self.last_error_message = reason.map(str::to_owned);
            }
            MatchState::Found | MatchState::Starting | MatchState::Cancelled => {}
        }
        self.current_state = target;
    }
}
