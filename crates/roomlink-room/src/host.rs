//! Host authority: who may manage the room.
//!
//! The local player either holds all five host permissions or none of
//! them. [`HostAuthority::refresh`] recomputes host status from a
//! snapshot and flips the whole permission set at once.
//!
//! Transfers and successions mutate the snapshot through
//! [`RoomSnapshot::set_host`], which moves `host_player_id` and every
//! `is_host` flag in one step: there is never a moment with two hosts or
//! none.

use roomlink_protocol::{PlayerId, RoomSnapshot, RoomStatus};
use tracing::info;

use crate::RoomError;

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// The host-gated capabilities of the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostPermissions {
    pub start_game: bool,
    pub modify_room: bool,
    pub kick_players: bool,
    pub transfer_host: bool,
    pub invite_players: bool,
}

impl HostPermissions {
    /// Every permission set to `value`.
    pub fn all(value: bool) -> Self {
        Self {
            start_game: value,
            modify_room: value,
            kick_players: value,
            transfer_host: value,
            invite_players: value,
        }
    }

    pub fn is_all(&self, value: bool) -> bool {
        *self == Self::all(value)
    }
}

// ---------------------------------------------------------------------------
// Start validation
// ---------------------------------------------------------------------------

/// A reason the game cannot start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBlocker {
    NoActiveRoom,
    NotHost,
    WrongStatus(RoomStatus),
    InsufficientPlayers { have: usize, need: usize },
    Expired,
    EnergyInsufficient { cost: u32 },
}

impl From<StartBlocker> for RoomError {
    fn from(blocker: StartBlocker) -> Self {
        match blocker {
            StartBlocker::NoActiveRoom => Self::NoActiveRoom,
            StartBlocker::NotHost => Self::NotHost,
            StartBlocker::WrongStatus(s) => Self::WrongStatus(s),
            StartBlocker::InsufficientPlayers { have, need } => {
                Self::InsufficientPlayers { have, need }
            }
            StartBlocker::Expired => Self::Expired,
            StartBlocker::EnergyInsufficient { cost } => Self::EnergyInsufficient { cost },
        }
    }
}

/// Advisory findings that must not block the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartWarning {
    NotAllReady { not_ready: Vec<PlayerId> },
}

/// Result of [`HostAuthority::validate_game_start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameStartCheck {
    pub errors: Vec<StartBlocker>,
    pub warnings: Vec<StartWarning>,
}

impl GameStartCheck {
    /// `true` when nothing blocks the start. Warnings do not count.
    pub fn can_start(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Inputs to start validation that do not live in the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct StartContext {
    pub now_ms: u64,
    pub min_players: u8,
    pub start_cost: u32,
    pub can_afford: bool,
}

// ---------------------------------------------------------------------------
// HostAuthority
// ---------------------------------------------------------------------------

/// Host status and permissions of the local player in one room.
#[derive(Debug, Clone)]
pub struct HostAuthority {
    local_player_id: PlayerId,
    is_host: bool,
    permissions: HostPermissions,
}

impl HostAuthority {
    /// Bind to `snapshot` for `local_player_id`.
    pub fn new(local_player_id: PlayerId, snapshot: &RoomSnapshot) -> Self {
        let is_host = snapshot.host_player_id == local_player_id;
        Self {
            local_player_id,
            is_host,
            permissions: HostPermissions::all(is_host),
        }
    }

    pub fn local_player_id(&self) -> PlayerId {
        self.local_player_id
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn permissions(&self) -> HostPermissions {
        self.permissions
    }

    /// Recompute host status after any snapshot change.
    ///
    /// Returns `Some(is_host)` when the status flipped.
    pub fn refresh(&mut self, snapshot: &RoomSnapshot) -> Option<bool> {
        let is_host = snapshot.host_player_id == self.local_player_id;
        if is_host == self.is_host {
            return None;
        }
        self.is_host = is_host;
        self.permissions = HostPermissions::all(is_host);
        info!(
            room_code = %snapshot.room_code,
            player_id = %self.local_player_id,
            is_host,
            "host status changed"
        );
        Some(is_host)
    }

    /// Hand host privileges to `target`.
    ///
    /// # Errors
    /// - `PermissionDenied` without the transfer-host permission
    /// - `TargetIsSelf` when `target` is the local player
    /// - `NotAMember` when `target` is not in the room
    pub fn transfer_host_to(
        &mut self,
        snapshot: &mut RoomSnapshot,
        target: PlayerId,
    ) -> Result<(), RoomError> {
        if !self.permissions.transfer_host {
            return Err(RoomError::PermissionDenied("transfer-host"));
        }
        if target == self.local_player_id {
            return Err(RoomError::TargetIsSelf);
        }
        snapshot
            .set_host(target)
            .map_err(|_| RoomError::NotAMember(target))?;
        self.refresh(snapshot);
        info!(room_code = %snapshot.room_code, new_host = %target, "host transferred");
        Ok(())
    }

    /// The host `departed` left: promote the next player after them in
    /// join order (wrapping), then remove them.
    ///
    /// Returns the new host, or `None` when nobody is left (the room is
    /// then eligible for closure) or `departed` was not the host.
    pub fn handle_host_disconnection(
        &mut self,
        snapshot: &mut RoomSnapshot,
        departed: PlayerId,
    ) -> Option<PlayerId> {
        if snapshot.host_player_id != departed {
            return None;
        }
        let successor = successor_of(snapshot, departed);
        if let Some(next) = successor {
            // set_host only fails for non-members; `next` came from the list.
            let _ = snapshot.set_host(next);
        }
        snapshot.remove_player(departed);
        self.refresh(snapshot);
        if let Some(next) = successor {
            info!(room_code = %snapshot.room_code, %departed, new_host = %next, "host succession");
        }
        successor
    }

    /// Collect every reason the local player cannot start the game yet.
    pub fn validate_game_start(
        &self,
        snapshot: Option<&RoomSnapshot>,
        ctx: StartContext,
    ) -> GameStartCheck {
        let mut check = GameStartCheck::default();
        let Some(snapshot) = snapshot else {
            check.errors.push(StartBlocker::NoActiveRoom);
            return check;
        };

        if !self.is_host || !self.permissions.start_game {
            check.errors.push(StartBlocker::NotHost);
        }
        if snapshot.status != RoomStatus::Waiting {
            check.errors.push(StartBlocker::WrongStatus(snapshot.status));
        }
        let need = usize::from(ctx.min_players);
        if snapshot.player_count() < need {
            check.errors.push(StartBlocker::InsufficientPlayers {
                have: snapshot.player_count(),
                need,
            });
        }
        if snapshot.is_expired(ctx.now_ms) {
            check.errors.push(StartBlocker::Expired);
        }
        if !ctx.can_afford {
            check
                .errors
                .push(StartBlocker::EnergyInsufficient { cost: ctx.start_cost });
        }

        let not_ready: Vec<PlayerId> = snapshot
            .players()
            .iter()
            .filter(|p| !p.is_ready)
            .map(|p| p.player_id)
            .collect();
        if !not_ready.is_empty() {
            check.warnings.push(StartWarning::NotAllReady { not_ready });
        }
        check
    }
}

/// The player after `departed` in join order, wrapping to the front.
fn successor_of(snapshot: &RoomSnapshot, departed: PlayerId) -> Option<PlayerId> {
    let players = snapshot.players();
    let index = players.iter().position(|p| p.player_id == departed)?;
    players
        .iter()
        .cycle()
        .skip(index + 1)
        .take(players.len() - 1)
        .map(|p| p.player_id)
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomlink_protocol::{PlayerInfo, RoomCode};

    fn pid(n: u64) -> PlayerId {
        PlayerId(n)
    }

    /// Room hosted by P-1 with members 2..=n in join order.
    fn room(n: u64) -> RoomSnapshot {
        let mut s = RoomSnapshot::new(
            RoomCode::parse("4821").unwrap(),
            PlayerInfo::new(pid(1), "a"),
            4,
            0,
            60_000,
        );
        for i in 2..=n {
            s.add_player(PlayerInfo::new(pid(i), format!("p{i}"))).unwrap();
        }
        s
    }

    fn ctx() -> StartContext {
        StartContext {
            now_ms: 1_000,
            min_players: 2,
            start_cost: 1,
            can_afford: true,
        }
    }

    #[test]
    fn test_new_host_gets_all_permissions() {
        let auth = HostAuthority::new(pid(1), &room(2));
        assert!(auth.is_host());
        assert!(auth.permissions().is_all(true));

        let guest = HostAuthority::new(pid(2), &room(2));
        assert!(!guest.is_host());
        assert!(guest.permissions().is_all(false));
    }

    #[test]
    fn test_refresh_flips_all_permissions_together() {
        let mut snapshot = room(2);
        let mut auth = HostAuthority::new(pid(2), &snapshot);
        assert_eq!(auth.refresh(&snapshot), None);

        snapshot.set_host(pid(2)).unwrap();
        assert_eq!(auth.refresh(&snapshot), Some(true));
        assert!(auth.permissions().is_all(true));
    }

    #[test]
    fn test_transfer_host_to_member_updates_snapshot_atomically() {
        let mut snapshot = room(3);
        let mut auth = HostAuthority::new(pid(1), &snapshot);

        auth.transfer_host_to(&mut snapshot, pid(3)).unwrap();

        assert_eq!(snapshot.host_player_id, pid(3));
        assert!(snapshot.check_invariants().is_ok());
        assert!(!auth.is_host());
        assert!(auth.permissions().is_all(false));
    }

    #[test]
    fn test_transfer_host_to_self_rejected() {
        let mut snapshot = room(2);
        let mut auth = HostAuthority::new(pid(1), &snapshot);
        assert!(matches!(
            auth.transfer_host_to(&mut snapshot, pid(1)),
            Err(RoomError::TargetIsSelf)
        ));
    }

    #[test]
    fn test_transfer_host_to_non_member_rejected() {
        let mut snapshot = room(2);
        let mut auth = HostAuthority::new(pid(1), &snapshot);
        assert!(matches!(
            auth.transfer_host_to(&mut snapshot, pid(9)),
            Err(RoomError::NotAMember(p)) if p == pid(9)
        ));
        assert_eq!(snapshot.host_player_id, pid(1));
    }

    #[test]
    fn test_transfer_host_without_permission_denied() {
        let mut snapshot = room(3);
        let mut auth = HostAuthority::new(pid(2), &snapshot);
        assert!(matches!(
            auth.transfer_host_to(&mut snapshot, pid(3)),
            Err(RoomError::PermissionDenied("transfer-host"))
        ));
    }

    #[test]
    fn test_handle_host_disconnection_promotes_next_in_join_order() {
        // Host A (P-1) leaves; B (P-2) and C (P-3) remain.
        let mut snapshot = room(3);
        let mut auth_b = HostAuthority::new(pid(2), &snapshot);

        let new_host = auth_b.handle_host_disconnection(&mut snapshot, pid(1));

        assert_eq!(new_host, Some(pid(2)));
        assert!(auth_b.permissions().is_all(true));
        assert!(!snapshot.contains(pid(1)));
        let hosts: Vec<_> = snapshot.players().iter().filter(|p| p.is_host).collect();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].player_id, pid(2));
    }

    #[test]
    fn test_handle_host_disconnection_wraps_around() {
        let mut snapshot = room(3);
        snapshot.set_host(pid(3)).unwrap();
        let mut auth = HostAuthority::new(pid(1), &snapshot);

        assert_eq!(auth.handle_host_disconnection(&mut snapshot, pid(3)), Some(pid(1)));
        assert!(auth.is_host());
    }

    #[test]
    fn test_handle_host_disconnection_last_player_returns_none() {
        let mut snapshot = room(1);
        let mut auth = HostAuthority::new(pid(1), &snapshot);
        assert_eq!(auth.handle_host_disconnection(&mut snapshot, pid(1)), None);
        assert_eq!(snapshot.player_count(), 0);
    }

    #[test]
    fn test_handle_host_disconnection_non_host_is_ignored() {
        let mut snapshot = room(3);
        let mut auth = HostAuthority::new(pid(1), &snapshot);
        assert_eq!(auth.handle_host_disconnection(&mut snapshot, pid(2)), None);
        assert!(snapshot.contains(pid(2)));
    }

    #[test]
    fn test_validate_game_start_not_ready_is_warning_only() {
        let snapshot = room(2);
        let auth = HostAuthority::new(pid(1), &snapshot);
        let check = auth.validate_game_start(Some(&snapshot), ctx());
        assert!(check.can_start());
        assert_eq!(
            check.warnings,
            vec![StartWarning::NotAllReady {
                not_ready: vec![pid(1), pid(2)]
            }]
        );
    }

    #[test]
    fn test_validate_game_start_collects_every_blocker() {
        let mut snapshot = room(1);
        snapshot.transition_status(RoomStatus::Starting).unwrap();
        let auth = HostAuthority::new(pid(2), &snapshot);

        let check = auth.validate_game_start(
            Some(&snapshot),
            StartContext {
                now_ms: 60_000,
                can_afford: false,
                ..ctx()
            },
        );
        assert_eq!(
            check.errors,
            vec![
                StartBlocker::NotHost,
                StartBlocker::WrongStatus(RoomStatus::Starting),
                StartBlocker::InsufficientPlayers { have: 1, need: 2 },
                StartBlocker::Expired,
                StartBlocker::EnergyInsufficient { cost: 1 },
            ]
        );
    }

    #[test]
    fn test_validate_game_start_without_room() {
        let auth = HostAuthority::new(pid(1), &room(2));
        let check = auth.validate_game_start(None, ctx());
        assert_eq!(check.errors, vec![StartBlocker::NoActiveRoom]);
    }
}
