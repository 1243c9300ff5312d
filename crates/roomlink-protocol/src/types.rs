//! Core data types shared by the client and the room server.
//!
//! Everything in this module travels on the wire: it is serialized by a
//! [`Codec`](crate::Codec), sent over the transport, and deserialized on
//! the other side. Because deserialization can produce any shape the
//! server chooses to send, [`RoomSnapshot::check_invariants`] exists so
//! the client can refuse snapshots that would corrupt its local room.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a `PlayerId` can never be confused with a sync
/// version or a timestamp. `#[serde(transparent)]` keeps it a plain number
/// on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A short, human-enterable room code: four digits in `1000..=9999`.
///
/// The only way to build one is [`RoomCode::parse`] (or
/// [`RoomCode::from_number`]), so holding a `RoomCode` means the format
/// has already been validated. Deserialization goes through the same
/// check via `#[serde(try_from = "String")]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Lowest code in the code space.
    pub const MIN: u16 = 1000;
    /// Highest code in the code space.
    pub const MAX: u16 = 9999;

    /// Validates and wraps a user-entered code.
    ///
    /// Surrounding whitespace is trimmed; anything other than exactly four
    /// ASCII digits with a non-zero leading digit is rejected.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        let valid = trimmed.len() == 4
            && trimmed.bytes().all(|b| b.is_ascii_digit())
            && !trimmed.starts_with('0');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ProtocolError::InvalidRoomCode(raw.to_string()))
        }
    }

    /// Builds a code from its numeric value.
    pub fn from_number(n: u16) -> Result<Self, ProtocolError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Self(n.to_string()))
        } else {
            Err(ProtocolError::InvalidRoomCode(n.to_string()))
        }
    }

    /// The code as entered by players.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The four digits of the code, most significant first.
    pub fn digits(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        for (slot, b) in out.iter_mut().zip(self.0.bytes()) {
            *slot = b - b'0';
        }
        out
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The server-side lifecycle status of a room.
///
/// ```text
/// Waiting ──→ Starting ──→ InGame
///    │            │           │
///    └────────────┴───────────┴──→ Closed
/// ```
///
/// `Closed` is terminal. There is no edge back to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoomStatus {
    /// Accepting players; the host may start once enough have joined.
    #[default]
    Waiting,
    /// The host started the game; clients are loading.
    Starting,
    /// The game is running. This crate's responsibility ends here.
    InGame,
    /// The room is gone (left, expired, or closed by the server).
    Closed,
}

impl RoomStatus {
    /// Returns `true` if new players may join.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Starting)
                | (Self::Starting, Self::InGame)
                | (Self::Waiting, Self::Closed)
                | (Self::Starting, Self::Closed)
                | (Self::InGame, Self::Closed)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Starting => write!(f, "Starting"),
            Self::InGame => write!(f, "InGame"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// PlayerInfo
// ---------------------------------------------------------------------------

/// One member of a room.
///
/// `is_host` is owned by the room: [`RoomSnapshot::add_player`] and
/// [`RoomSnapshot::update_player`] ignore the flag on incoming values,
/// and only [`RoomSnapshot::set_host`] changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub nickname: String,
    pub is_host: bool,
    pub is_ready: bool,
}

impl PlayerInfo {
    /// A fresh, non-host, not-ready member.
    pub fn new(player_id: PlayerId, nickname: impl Into<String>) -> Self {
        Self {
            player_id,
            nickname: nickname.into(),
            is_host: false,
            is_ready: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSnapshot
// ---------------------------------------------------------------------------

/// The full known state of one room.
///
/// Invariants (checked by [`check_invariants`](Self::check_invariants)):
/// - exactly one player has `is_host == true`, and it is `host_player_id`
/// - `players.len() <= max_players`
/// - player ids are unique
///
/// `players` is kept in join order. Host succession depends on that order,
/// so it is private and only changed through the mutation methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_code: RoomCode,
    pub host_player_id: PlayerId,
    pub max_players: u8,
    pub status: RoomStatus,
    players: Vec<PlayerInfo>,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds.
    pub expires_at: u64,
    /// Monotonic per-room version stamped by the server on every push.
    #[serde(default)]
    pub sync_version: u64,
    /// Optional per-player versions, bumped by incremental updates.
    #[serde(default)]
    pub player_versions: HashMap<PlayerId, u64>,
}

impl RoomSnapshot {
    /// Creates a `Waiting` room whose only member is its host.
    pub fn new(
        room_code: RoomCode,
        host: PlayerInfo,
        max_players: u8,
        created_at: u64,
        expires_at: u64,
    ) -> Self {
        let host_player_id = host.player_id;
        let host = PlayerInfo {
            is_host: true,
            ..host
        };
        Self {
            room_code,
            host_player_id,
            max_players,
            status: RoomStatus::Waiting,
            players: vec![host],
            created_at,
            expires_at,
            sync_version: 0,
            player_versions: HashMap::new(),
        }
    }

    /// Members in join order.
    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.player(player_id).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.max_players)
    }

    /// The current host's entry, if the host is still a member.
    pub fn host(&self) -> Option<&PlayerInfo> {
        self.player(self.host_player_id)
    }

    /// Returns `true` once `now_ms` has reached `expires_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Returns `true` if every member has marked themselves ready.
    pub fn all_ready(&self) -> bool {
        self.players.iter().all(|p| p.is_ready)
    }

    /// Appends a member. The incoming `is_host` flag is ignored.
    pub fn add_player(&mut self, player: PlayerInfo) -> Result<(), ProtocolError> {
        if self.contains(player.player_id) {
            return Err(ProtocolError::InvariantViolation(format!(
                "player {} already in room {}",
                player.player_id, self.room_code
            )));
        }
        if self.is_full() {
            return Err(ProtocolError::InvariantViolation(format!(
                "room {} is full ({} players)",
                self.room_code, self.max_players
            )));
        }
        self.players.push(PlayerInfo {
            is_host: false,
            ..player
        });
        Ok(())
    }

    /// Removes a member and returns it.
    ///
    /// Removing the host leaves `host_player_id` dangling; callers that
    /// remove a host promote a successor with [`set_host`](Self::set_host)
    /// inside the same mutation.
    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<PlayerInfo> {
        let index = self.players.iter().position(|p| p.player_id == player_id)?;
        self.player_versions.remove(&player_id);
        Some(self.players.remove(index))
    }

    /// Replaces a member's nickname and ready flag. Returns `false` if the
    /// player is not in the room.
    pub fn update_player(&mut self, player: PlayerInfo) -> bool {
        match self.players.iter_mut().find(|p| p.player_id == player.player_id) {
            Some(existing) => {
                existing.nickname = player.nickname;
                existing.is_ready = player.is_ready;
                true
            }
            None => false,
        }
    }

    pub fn set_ready(&mut self, player_id: PlayerId, ready: bool) -> bool {
        match self.players.iter_mut().find(|p| p.player_id == player_id) {
            Some(existing) => {
                existing.is_ready = ready;
                true
            }
            None => false,
        }
    }

    /// Makes `player_id` the one and only host.
    ///
    /// `host_player_id` and every member's `is_host` flag change in one
    /// pass, so no caller can observe two hosts or zero hosts.
    pub fn set_host(&mut self, player_id: PlayerId) -> Result<(), ProtocolError> {
        if !self.contains(player_id) {
            return Err(ProtocolError::InvariantViolation(format!(
                "cannot make non-member {player_id} host of room {}",
                self.room_code
            )));
        }
        self.host_player_id = player_id;
        for p in &mut self.players {
            p.is_host = p.player_id == player_id;
        }
        Ok(())
    }

    /// Moves the room along a legal status edge.
    pub fn transition_status(&mut self, target: RoomStatus) -> Result<(), ProtocolError> {
        if !self.status.can_transition_to(target) {
            return Err(ProtocolError::InvariantViolation(format!(
                "illegal status transition {} -> {target}",
                self.status
            )));
        }
        self.status = target;
        Ok(())
    }

    /// Checks the structural invariants listed on the type.
    pub fn check_invariants(&self) -> Result<(), ProtocolError> {
        if self.players.len() > usize::from(self.max_players) {
            return Err(ProtocolError::InvariantViolation(format!(
                "{} players exceed max {}",
                self.players.len(),
                self.max_players
            )));
        }
        for (i, p) in self.players.iter().enumerate() {
            if self.players[..i].iter().any(|q| q.player_id == p.player_id) {
                return Err(ProtocolError::InvariantViolation(format!(
                    "duplicate player {}",
                    p.player_id
                )));
            }
        }
        if self.players.is_empty() {
            return Ok(());
        }
        let hosts: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.is_host)
            .map(|p| p.player_id)
            .collect();
        match hosts.as_slice() {
            [only] if *only == self.host_player_id => Ok(()),
            [only] => Err(ProtocolError::InvariantViolation(format!(
                "host flag on {only} but host_player_id is {}",
                self.host_player_id
            ))),
            other => Err(ProtocolError::InvariantViolation(format!(
                "{} players flagged as host",
                other.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn code(raw: &str) -> RoomCode {
        RoomCode::parse(raw).unwrap()
    }

    fn room_with(ids: &[u64]) -> RoomSnapshot {
        let mut room = RoomSnapshot::new(
            code("4821"),
            PlayerInfo::new(pid(ids[0]), "host"),
            4,
            0,
            1_800_000,
        );
        for id in &ids[1..] {
            room.add_player(PlayerInfo::new(pid(*id), format!("p{id}")))
                .unwrap();
        }
        room
    }

    // =====================================================================
    // RoomCode
    // =====================================================================

    #[test]
    fn test_room_code_parse_accepts_four_digits() {
        assert_eq!(code("4821").as_str(), "4821");
        assert_eq!(code(" 1000 ").as_str(), "1000");
    }

    #[test]
    fn test_room_code_parse_rejects_bad_formats() {
        for raw in ["", "123", "12345", "0123", "12a4", "-123", "１２３４"] {
            assert!(
                matches!(RoomCode::parse(raw), Err(ProtocolError::InvalidRoomCode(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_room_code_from_number_range() {
        assert!(RoomCode::from_number(999).is_err());
        assert_eq!(RoomCode::from_number(9999).unwrap().as_str(), "9999");
    }

    #[test]
    fn test_room_code_serializes_as_string_and_validates_on_decode() {
        let json = serde_json::to_string(&code("4821")).unwrap();
        assert_eq!(json, "\"4821\"");
        assert!(serde_json::from_str::<RoomCode>("\"0001\"").is_err());
    }

    #[test]
    fn test_room_code_digits() {
        assert_eq!(code("1234").digits(), [1, 2, 3, 4]);
    }

    // =====================================================================
    // RoomStatus
    // =====================================================================

    #[test]
    fn test_room_status_legal_edges() {
        use RoomStatus::*;
        assert!(Waiting.can_transition_to(Starting));
        assert!(Starting.can_transition_to(InGame));
        assert!(InGame.can_transition_to(Closed));
        assert!(!Waiting.can_transition_to(InGame));
        assert!(!InGame.can_transition_to(Waiting));
        assert!(!Closed.can_transition_to(Waiting));
    }

    // =====================================================================
    // RoomSnapshot
    // =====================================================================

    #[test]
    fn test_new_snapshot_has_single_host() {
        let room = room_with(&[1]);
        assert_eq!(room.host_player_id, pid(1));
        assert!(room.players()[0].is_host);
        room.check_invariants().unwrap();
    }

    #[test]
    fn test_add_player_ignores_incoming_host_flag() {
        let mut room = room_with(&[1]);
        let mut sneaky = PlayerInfo::new(pid(2), "sneaky");
        sneaky.is_host = true;
        room.add_player(sneaky).unwrap();
        assert!(!room.player(pid(2)).unwrap().is_host);
        room.check_invariants().unwrap();
    }

    #[test]
    fn test_add_player_rejects_duplicates_and_overflow() {
        let mut room = room_with(&[1, 2, 3, 4]);
        assert!(room.add_player(PlayerInfo::new(pid(2), "dup")).is_err());
        assert!(room.add_player(PlayerInfo::new(pid(5), "late")).is_err());
    }

    #[test]
    fn test_set_host_moves_flag_atomically() {
        let mut room = room_with(&[1, 2, 3]);
        room.set_host(pid(3)).unwrap();
        let hosts: Vec<_> = room.players().iter().filter(|p| p.is_host).collect();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].player_id, pid(3));
        assert_eq!(room.host_player_id, pid(3));
    }

    #[test]
    fn test_set_host_rejects_non_member() {
        let mut room = room_with(&[1, 2]);
        assert!(room.set_host(pid(9)).is_err());
        assert_eq!(room.host_player_id, pid(1));
    }

    #[test]
    fn test_check_invariants_detects_two_hosts() {
        let json = serde_json::json!({
            "room_code": "4821",
            "host_player_id": 1,
            "max_players": 4,
            "status": "Waiting",
            "players": [
                { "player_id": 1, "nickname": "a", "is_host": true, "is_ready": false },
                { "player_id": 2, "nickname": "b", "is_host": true, "is_ready": false }
            ],
            "created_at": 0,
            "expires_at": 10
        });
        let room: RoomSnapshot = serde_json::from_value(json).unwrap();
        assert!(matches!(
            room.check_invariants(),
            Err(ProtocolError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_check_invariants_detects_mismatched_host_id() {
        let mut room = room_with(&[1, 2]);
        room.host_player_id = pid(2);
        assert!(room.check_invariants().is_err());
    }

    #[test]
    fn test_transition_status_rejects_illegal_edge() {
        let mut room = room_with(&[1, 2]);
        assert!(room.transition_status(RoomStatus::InGame).is_err());
        room.transition_status(RoomStatus::Starting).unwrap();
        assert_eq!(room.status, RoomStatus::Starting);
    }

    #[test]
    fn test_is_expired_at_boundary() {
        let room = room_with(&[1]);
        assert!(!room.is_expired(1_799_999));
        assert!(room.is_expired(1_800_000));
    }

    #[test]
    fn test_remove_player_preserves_join_order() {
        let mut room = room_with(&[1, 2, 3, 4]);
        room.remove_player(pid(2));
        let ids: Vec<_> = room.players().iter().map(|p| p.player_id).collect();
        assert_eq!(ids, vec![pid(1), pid(3), pid(4)]);
    }
}
