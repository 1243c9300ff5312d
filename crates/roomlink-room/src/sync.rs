//! Room state reconciliation.
//!
//! [`RoomSynchronizer`] owns the local [`RoomSnapshot`] and the sync-version
//! high-water mark of the bound room. The rules:
//!
//! - **Apply rule.** A pushed snapshot replaces local state wholesale only
//!   if its `sync_version` is strictly greater than the last applied
//!   version. Anything else is stale and dropped.
//! - **Conflicts.** A newer snapshot that names a different host, or moves
//!   the status other than `Waiting→Starting`/`Starting→InGame`, is not
//!   applied. Neither is one that changes the member set while local
//!   optimistic operations are unconfirmed. It is classified and
//!   reported, and the caller fetches a fresh authoritative snapshot
//!   (applied through [`RoomSynchronizer::apply_authoritative`]) instead
//!   of merging.
//! - **Incremental updates.** Player joined/left/updated and host-changed
//!   pushes patch the snapshot directly and bump a per-player version.
//!
//! The synchronizer does no I/O. The session manager feeds it and acts on
//! the outcomes.

use std::fmt;
use std::time::Duration;

use roomlink_protocol::{PlayerId, PlayerInfo, RoomCode, RoomSnapshot, RoomStatus};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a snapshot disagreed with local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Host,
    Status,
    PlayerCount,
    /// Same host, status and count, but a different member set.
    General,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Host => "host conflict",
            Self::Status => "status conflict",
            Self::PlayerCount => "player count conflict",
            Self::General => "general conflict",
        };
        f.write_str(s)
    }
}

impl ConflictKind {
    /// Host and status conflicts are raised even with nothing pending.
    pub fn is_authority(self) -> bool {
        matches!(self, Self::Host | Self::Status)
    }
}

/// Result of offering a snapshot to the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state was replaced.
    Applied { version: u64 },
    /// `version` was not newer than `current`; dropped.
    Stale { version: u64, current: u64 },
    /// Disagreed with local state; not applied.
    Conflict {
        kind: ConflictKind,
        local_version: u64,
        incoming_version: u64,
    },
    /// Failed invariant checks; not applied.
    Invalid(String),
    /// For a room other than the bound one.
    WrongRoom,
}

/// An optimistic local change waiting for server confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: u64,
    pub kind: &'static str,
    pub started_at_ms: u64,
}

#[derive(Debug, Clone)]
struct ConflictRecord {
    kind: ConflictKind,
    at_ms: u64,
}

/// Findings of one [`RoomSynchronizer::health_check`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// The transport reported itself down.
    pub connection_lost: bool,
    /// Unconfirmed optimistic operations.
    pub backlog: usize,
    pub backlog_exceeded: bool,
    /// Conflict records older than the retention window that were dropped.
    pub conflicts_swept: usize,
    /// Connected, in a room and no sync in flight: time for a proactive
    /// full sync. The answer also settles any unconfirmed operations.
    pub should_request_sync: bool,
}

// ---------------------------------------------------------------------------
// RoomSynchronizer
// ---------------------------------------------------------------------------

/// Authoritative local copy of the current room.
#[derive(Debug)]
pub struct RoomSynchronizer {
    snapshot: Option<RoomSnapshot>,
    /// High-water mark of the bound room.
    version: u64,
    pending: Vec<PendingOperation>,
    next_operation_id: u64,
    conflicts: Vec<ConflictRecord>,
    sync_in_flight: bool,
    performance_target: Duration,
    conflict_retention: Duration,
    max_pending_operations: usize,
}

impl RoomSynchronizer {
    pub fn new(
        performance_target: Duration,
        conflict_retention: Duration,
        max_pending_operations: usize,
    ) -> Self {
        Self {
            snapshot: None,
            version: 0,
            pending: Vec::new(),
            next_operation_id: 1,
            conflicts: Vec::new(),
            sync_in_flight: false,
            performance_target,
            conflict_retention,
            max_pending_operations,
        }
    }

    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.snapshot.as_ref()
    }

    /// Mutable access for local optimistic changes. Callers pair each
    /// mutation with [`begin_operation`](Self::begin_operation).
    pub fn snapshot_mut(&mut self) -> Option<&mut RoomSnapshot> {
        self.snapshot.as_mut()
    }

    pub fn room_code(&self) -> Option<&RoomCode> {
        self.snapshot.as_ref().map(|s| &s.room_code)
    }

    /// The last applied version for `code`, if it is the bound room.
    pub fn version(&self, code: &RoomCode) -> Option<u64> {
        (self.room_code() == Some(code)).then_some(self.version)
    }

    /// The last applied version for the bound room, or 0.
    pub fn current_version(&self) -> u64 {
        if self.snapshot.is_some() { self.version } else { 0 }
    }

    /// Bind to the snapshot a create or join response returned.
    pub fn bind(&mut self, snapshot: RoomSnapshot) -> Result<(), String> {
        snapshot.check_invariants().map_err(|e| e.to_string())?;
        info!(
            room_code = %snapshot.room_code,
            version = snapshot.sync_version,
            players = snapshot.player_count(),
            "synchronizer bound"
        );
        self.version = snapshot.sync_version;
        self.snapshot = Some(snapshot);
        self.pending.clear();
        self.sync_in_flight = false;
        Ok(())
    }

    /// Drop the bound room. Pushes for it are refused as `WrongRoom` from
    /// now on, and a later join starts from the server's version.
    pub fn clear(&mut self) -> Option<RoomSnapshot> {
        self.version = 0;
        self.pending.clear();
        self.sync_in_flight = false;
        self.snapshot.take()
    }

    // -- Snapshots ----------------------------------------------------------

    /// Offer a server-pushed snapshot.
    pub fn apply_snapshot(&mut self, incoming: RoomSnapshot, now_ms: u64) -> ApplyOutcome {
        let Some(local) = &self.snapshot else {
            return ApplyOutcome::WrongRoom;
        };
        if local.room_code != incoming.room_code {
            debug!(room_code = %incoming.room_code, "push for another room dropped");
            return ApplyOutcome::WrongRoom;
        }
        if let Err(e) = incoming.check_invariants() {
            warn!(room_code = %incoming.room_code, error = %e, "invalid snapshot rejected");
            return ApplyOutcome::Invalid(e.to_string());
        }

        let current = self.current_version();
        if incoming.sync_version <= current {
            debug!(
                room_code = %incoming.room_code,
                version = incoming.sync_version,
                current,
                "stale snapshot dropped"
            );
            return ApplyOutcome::Stale {
                version: incoming.sync_version,
                current,
            };
        }

        // Host and status disagreements are never taken from a push
        // directly; membership drift only matters against local changes.
        let conflict = classify_conflict(local, &incoming)
            .filter(|kind| kind.is_authority() || !self.pending.is_empty());
        if let Some(kind) = conflict {
            warn!(
                room_code = %incoming.room_code,
                %kind,
                local_version = current,
                incoming_version = incoming.sync_version,
                pending = self.pending.len(),
                "snapshot conflicts with local state"
            );
            self.conflicts.push(ConflictRecord { kind, at_ms: now_ms });
            return ApplyOutcome::Conflict {
                kind,
                local_version: current,
                incoming_version: incoming.sync_version,
            };
        }

        self.replace(incoming)
    }

    /// Apply the answer to a full state sync.
    ///
    /// The server's answer is authoritative: it may carry the version we
    /// already hold (nothing changed since) and still clears every
    /// pending optimistic change.
    pub fn apply_authoritative(&mut self, incoming: RoomSnapshot) -> ApplyOutcome {
        self.sync_in_flight = false;
        let Some(local) = &self.snapshot else {
            return ApplyOutcome::WrongRoom;
        };
        if local.room_code != incoming.room_code {
            return ApplyOutcome::WrongRoom;
        }
        if let Err(e) = incoming.check_invariants() {
            warn!(room_code = %incoming.room_code, error = %e, "invalid sync response rejected");
            return ApplyOutcome::Invalid(e.to_string());
        }
        let current = self.current_version();
        if incoming.sync_version < current {
            debug!(version = incoming.sync_version, current, "sync response older than applied state");
            return ApplyOutcome::Stale {
                version: incoming.sync_version,
                current,
            };
        }
        self.replace(incoming)
    }

    fn replace(&mut self, incoming: RoomSnapshot) -> ApplyOutcome {
        let version = incoming.sync_version;
        self.version = version;
        debug!(room_code = %incoming.room_code, version, "snapshot applied");
        self.snapshot = Some(incoming);
        self.pending.clear();
        ApplyOutcome::Applied { version }
    }

    // -- Incremental updates ------------------------------------------------

    /// Returns `false` if the push does not fit local state.
    pub fn apply_player_joined(&mut self, code: &RoomCode, player: PlayerInfo) -> bool {
        let Some(snapshot) = self.bound_mut(code) else {
            return false;
        };
        let player_id = player.player_id;
        if snapshot.add_player(player).is_err() {
            debug!(%player_id, "player-joined push ignored");
            return false;
        }
        bump_player_version(snapshot, player_id);
        true
    }

    /// Removes a non-host member. Host departures go through
    /// [`HostAuthority::handle_host_disconnection`](crate::HostAuthority::handle_host_disconnection).
    pub fn apply_player_left(&mut self, code: &RoomCode, player_id: PlayerId) -> bool {
        let Some(snapshot) = self.bound_mut(code) else {
            return false;
        };
        if snapshot.host_player_id == player_id {
            return false;
        }
        snapshot.remove_player(player_id).is_some()
    }

    pub fn apply_player_updated(&mut self, code: &RoomCode, player: PlayerInfo) -> bool {
        let Some(snapshot) = self.bound_mut(code) else {
            return false;
        };
        let player_id = player.player_id;
        if !snapshot.update_player(player) {
            return false;
        }
        bump_player_version(snapshot, player_id);
        true
    }

    pub fn apply_host_changed(&mut self, code: &RoomCode, new_host_id: PlayerId) -> bool {
        let Some(snapshot) = self.bound_mut(code) else {
            return false;
        };
        if snapshot.set_host(new_host_id).is_err() {
            return false;
        }
        bump_player_version(snapshot, new_host_id);
        true
    }

    pub fn apply_status(&mut self, code: &RoomCode, status: RoomStatus) -> bool {
        self.bound_mut(code)
            .is_some_and(|s| s.status == status || s.transition_status(status).is_ok())
    }

    fn bound_mut(&mut self, code: &RoomCode) -> Option<&mut RoomSnapshot> {
        self.snapshot.as_mut().filter(|s| &s.room_code == code)
    }

    // -- Optimistic operations ---------------------------------------------

    /// Register an optimistic local change. Returns its id.
    pub fn begin_operation(&mut self, kind: &'static str, now_ms: u64) -> u64 {
        let id = self.next_operation_id;
        self.next_operation_id += 1;
        self.pending.push(PendingOperation {
            id,
            kind,
            started_at_ms: now_ms,
        });
        id
    }

    /// The server confirmed operation `id`.
    pub fn confirm(&mut self, id: u64) -> bool {
        let before = self.pending.len();
        self.pending.retain(|op| op.id != id);
        self.pending.len() != before
    }

    pub fn pending_operations(&self) -> &[PendingOperation] {
        &self.pending
    }

    // -- Sync bookkeeping ---------------------------------------------------

    /// Mark a full sync as requested. Returns `false` if one is already
    /// in flight.
    pub fn begin_sync(&mut self) -> bool {
        !std::mem::replace(&mut self.sync_in_flight, true)
    }

    /// The sync round trip ended without an applicable answer.
    pub fn sync_failed(&mut self) {
        self.sync_in_flight = false;
    }

    pub fn is_sync_in_flight(&self) -> bool {
        self.sync_in_flight
    }

    /// Compare an operation's duration with the performance target.
    /// Returns the elapsed time when it was exceeded.
    pub fn check_budget(&self, operation: &'static str, elapsed: Duration) -> Option<Duration> {
        if elapsed <= self.performance_target {
            return None;
        }
        warn!(
            operation,
            elapsed_ms = elapsed.as_millis() as u64,
            target_ms = self.performance_target.as_millis() as u64,
            "sync operation exceeded performance target"
        );
        Some(elapsed)
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Conflicts of `kind` still retained.
    pub fn conflicts_of(&self, kind: ConflictKind) -> usize {
        self.conflicts.iter().filter(|c| c.kind == kind).count()
    }

    /// Periodic health pass.
    pub fn health_check(&mut self, now_ms: u64, connected: bool) -> HealthReport {
        let retention = self.conflict_retention.as_millis() as u64;
        let before = self.conflicts.len();
        self.conflicts
            .retain(|c| now_ms.saturating_sub(c.at_ms) < retention);
        let conflicts_swept = before - self.conflicts.len();

        let backlog = self.pending.len();
        let backlog_exceeded = backlog > self.max_pending_operations;
        if backlog_exceeded {
            warn!(backlog, limit = self.max_pending_operations, "pending operation backlog exceeded");
        }

        HealthReport {
            connection_lost: !connected,
            backlog,
            backlog_exceeded,
            conflicts_swept,
            should_request_sync: connected && self.snapshot.is_some() && !self.sync_in_flight,
        }
    }
}

/// Classify how `incoming` disagrees with `local`, if it does.
fn classify_conflict(local: &RoomSnapshot, incoming: &RoomSnapshot) -> Option<ConflictKind> {
    if local.host_player_id != incoming.host_player_id {
        return Some(ConflictKind::Host);
    }
    if is_conflicting_status(local.status, incoming.status) {
        return Some(ConflictKind::Status);
    }
    if local.player_count() != incoming.player_count() {
        return Some(ConflictKind::PlayerCount);
    }
    let differs = local
        .players()
        .iter()
        .any(|p| !incoming.contains(p.player_id));
    differs.then_some(ConflictKind::General)
}

/// Any status mismatch except the two benign forward steps.
fn is_conflicting_status(local: RoomStatus, incoming: RoomStatus) -> bool {
    if local == incoming {
        return false;
    }
    !matches!(
        (local, incoming),
        (RoomStatus::Waiting, RoomStatus::Starting) | (RoomStatus::Starting, RoomStatus::InGame)
    )
}

fn bump_player_version(snapshot: &mut RoomSnapshot, player_id: PlayerId) {
    *snapshot.player_versions.entry(player_id).or_insert(0) += 1;
}
