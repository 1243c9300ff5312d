//! Room session manager: the local client's room lifecycle.
//!
//! One [`RoomSessionManager`] per local session. It owns the
//! [`RoomSynchronizer`] (and with it the only mutable room snapshot), the
//! [`HostAuthority`] for the current room, and the join policies. All
//! methods take `&mut self`; the session actor in
//! [`handle`](crate::handle) serialises calls so every mutation happens
//! on one timeline.
//!
//! ```text
//! NoRoom ─create─► Creating ─► Hosting(Waiting) ─start─► Hosting(Starting)
//! NoRoom ─join──► Joining  ─► Participating(Waiting) ──► Participating(Starting)
//!                              any in-room state ─leave / close─► NoRoom
//! ```

use std::sync::Arc;

use roomlink_protocol::{
    PlayerId, ProtocolError, RejectReason, RoomCode, RoomPush, RoomRequest, RoomResponse,
    RoomSnapshot, RoomStatus,
};
use roomlink_runtime::{EventBus, SharedClock, Subscription};
use roomlink_session::{LocalIdentity, RecoveryState};
use roomlink_transport::Transport;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    ApplyOutcome, EnergyLedger, GameStartCheck, HealthReport, HostAuthority, HostPermissions,
    LocalState, RoomCloseReason, RoomCodeRegistry, RoomConfig, RoomError, RoomEvent,
    RoomSynchronizer, SlidingWindowLimiter, StartBlocker, StartContext, StartWarning,
};

/// Orchestrates create/join/leave/start and reacts to server pushes.
pub struct RoomSessionManager<T, E> {
    identity: LocalIdentity,
    policy_key: String,
    transport: Arc<T>,
    energy: Arc<E>,
    registry: RoomCodeRegistry,
    limiter: SlidingWindowLimiter,
    config: RoomConfig,
    clock: SharedClock,
    state: LocalState,
    host: Option<HostAuthority>,
    sync: RoomSynchronizer,
    events: EventBus<RoomEvent>,
    /// The code this client reserved when it created the current room.
    own_code: Option<RoomCode>,
}

impl<T: Transport, E: EnergyLedger> RoomSessionManager<T, E> {
    pub fn new(
        identity: LocalIdentity,
        transport: Arc<T>,
        energy: Arc<E>,
        registry: RoomCodeRegistry,
        config: RoomConfig,
        clock: SharedClock,
    ) -> Self {
        let policy_key = identity.policy_key();
        let limiter = SlidingWindowLimiter::new(config.join_rate_limit, config.join_rate_window);
        let sync = RoomSynchronizer::new(
            config.sync_performance_target,
            config.conflict_retention,
            config.max_pending_operations,
        );
        Self {
            identity,
            policy_key,
            transport,
            energy,
            registry,
            limiter,
            config,
            clock,
            state: LocalState::NoRoom,
            host: None,
            sync,
            events: EventBus::default(),
            own_code: None,
        }
    }

    /// Key join policies by something other than the player id (for
    /// example a device or network identity).
    pub fn with_policy_key(mut self, key: impl Into<String>) -> Self {
        self.policy_key = key.into();
        self
    }

    // -- Accessors ----------------------------------------------------------

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn state(&self) -> LocalState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.sync.snapshot()
    }

    pub fn room_code(&self) -> Option<&RoomCode> {
        self.sync.room_code()
    }

    pub fn is_host(&self) -> bool {
        self.host.as_ref().is_some_and(HostAuthority::is_host)
    }

    pub fn permissions(&self) -> HostPermissions {
        self.host
            .as_ref()
            .map(HostAuthority::permissions)
            .unwrap_or_default()
    }

    pub fn synchronizer(&self) -> &RoomSynchronizer {
        &self.sync
    }

    pub fn registry(&self) -> &RoomCodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn subscribe(&self) -> Subscription<RoomEvent> {
        self.events.subscribe()
    }

    /// A clone of the event bus, for handles that outlive a borrow.
    pub fn events(&self) -> EventBus<RoomEvent> {
        self.events.clone()
    }

    fn emit(&self, event: RoomEvent) {
        self.events.emit(event);
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    // -- Create -------------------------------------------------------------

    /// Create a room for `max_players` players and host it.
    ///
    /// Leaves the current room first. The player count is validated
    /// before anything touches the network.
    pub async fn create_room(&mut self, max_players: u8) -> Result<RoomSnapshot, RoomError> {
        let range = self.config.max_players_range.clone();
        if !range.contains(&max_players) {
            return Err(RoomError::InvalidPlayerCount {
                requested: max_players,
                min: *range.start(),
                max: *range.end(),
            });
        }
        if !self.energy.can_afford(self.config.create_cost) {
            return Err(RoomError::EnergyInsufficient {
                cost: self.config.create_cost,
            });
        }

        self.leave_if_in_room().await;
        self.state = LocalState::Creating;

        match self.send_create(max_players).await {
            Ok((code, snapshot)) => {
                if let Err(e) = self.enter_room(snapshot.clone()) {
                    self.registry.release(&code);
                    self.abandon_server_room(&snapshot.room_code).await;
                    return Err(e);
                }
                self.registry.activate(&code);
                self.energy.consume(self.config.create_cost);
                self.own_code = Some(code);
                info!(room_code = %snapshot.room_code, max_players, "room created");
                self.emit(RoomEvent::RoomCreated {
                    snapshot: snapshot.clone(),
                });
                Ok(snapshot)
            }
            Err(e) => {
                self.state = LocalState::NoRoom;
                Err(e)
            }
        }
    }

    /// Draw a code and send the create request, drawing again when the
    /// server already uses the code.
    async fn send_create(&mut self, max_players: u8) -> Result<(RoomCode, RoomSnapshot), RoomError> {
        let mut retries = 0;
        loop {
            let code = match self.registry.generate() {
                Ok(code) => code,
                Err(e) => {
                    if matches!(e, RoomError::CodeGenerationExhausted { .. }) {
                        self.emit(RoomEvent::CodeSpaceExhausted);
                    }
                    return Err(e);
                }
            };

            let request = RoomRequest::CreateRoom {
                code: code.clone(),
                max_players,
            };
            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    self.registry.release(&code);
                    return Err(e.into());
                }
            };

            match response {
                RoomResponse::Snapshot { snapshot } => return Ok((code, snapshot)),
                RoomResponse::Rejected {
                    reason: RejectReason::CodeInUse,
                    ..
                } if retries < self.config.create_code_retries => {
                    // Left reserved until its TTL so the next draw avoids it.
                    retries += 1;
                    debug!(%code, retries, "server already uses code, drawing another");
                }
                RoomResponse::Rejected { reason, message } => {
                    self.registry.release(&code);
                    if reason == RejectReason::CodeSpaceExhausted {
                        warn!("server reports room code space exhausted");
                        self.emit(RoomEvent::CodeSpaceExhausted);
                    }
                    return Err(rejection(reason, message, &code));
                }
                RoomResponse::Ack => {
                    self.registry.release(&code);
                    return Err(RoomError::UnexpectedResponse("CreateRoom"));
                }
            }
        }
    }

    // -- Join ---------------------------------------------------------------

    /// Join the room behind `raw_code`.
    ///
    /// Policy checks (format, rate limit, lockout, energy) run before the
    /// request goes out. A `RoomNotFound` answer counts as a failed guess
    /// for the brute-force guard; a successful join forgives earlier ones.
    pub async fn join_room(&mut self, raw_code: &str) -> Result<RoomSnapshot, RoomError> {
        let code =
            RoomCode::parse(raw_code).map_err(|_| RoomError::InvalidRoomCode(raw_code.to_owned()))?;

        let now = self.now();
        if let Err(retry_after) = self.limiter.try_acquire(&self.policy_key, now) {
            debug!(key = %self.policy_key, ?retry_after, "join rate limited");
            return Err(RoomError::RateLimited { retry_after });
        }
        self.registry
            .check_lockout(&self.policy_key)
            .map_err(|remaining| RoomError::SecurityLockout { remaining })?;
        if !self.energy.can_afford(self.config.join_cost) {
            return Err(RoomError::EnergyInsufficient {
                cost: self.config.join_cost,
            });
        }

        self.leave_if_in_room().await;
        self.state = LocalState::Joining;

        let response = self
            .transport
            .send(RoomRequest::JoinRoom { code: code.clone() })
            .await;
        let snapshot = match response {
            Ok(RoomResponse::Snapshot { snapshot }) => snapshot,
            Ok(RoomResponse::Rejected { reason, message }) => {
                self.state = LocalState::NoRoom;
                if reason == RejectReason::RoomNotFound {
                    if let Some(duration) = self.registry.record_failed_attempt(&self.policy_key) {
                        self.emit(RoomEvent::SecurityLockout { duration });
                    }
                }
                return Err(rejection(reason, message, &code));
            }
            Ok(RoomResponse::Ack) => {
                self.state = LocalState::NoRoom;
                return Err(RoomError::UnexpectedResponse("JoinRoom"));
            }
            Err(e) => {
                self.state = LocalState::NoRoom;
                return Err(e.into());
            }
        };

        if let Err(e) = self.enter_room(snapshot.clone()) {
            self.abandon_server_room(&code).await;
            return Err(e);
        }
        self.registry.record_success(&self.policy_key);
        self.energy.consume(self.config.join_cost);
        info!(
            room_code = %code,
            player_id = %self.identity.player_id,
            players = snapshot.player_count(),
            "joined room"
        );
        self.emit(RoomEvent::RoomJoined {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// The server seated us in a room whose snapshot we refused. Tell it
    /// we are gone; nothing local was set up.
    async fn abandon_server_room(&self, code: &RoomCode) {
        warn!(room_code = %code, "server snapshot rejected, leaving room");
        if let Err(e) = self
            .transport
            .send(RoomRequest::LeaveRoom { code: code.clone() })
            .await
        {
            debug!(room_code = %code, error = %e, "leave after rejected snapshot failed");
        }
    }

    fn enter_room(&mut self, snapshot: RoomSnapshot) -> Result<(), RoomError> {
        self.sync.bind(snapshot).map_err(|e| {
            self.state = LocalState::NoRoom;
            RoomError::Protocol(ProtocolError::InvariantViolation(e))
        })?;
        let Some(snapshot) = self.sync.snapshot() else {
            return Err(RoomError::NoActiveRoom);
        };
        let host = HostAuthority::new(self.identity.player_id, snapshot);
        self.state = LocalState::in_room(host.is_host(), snapshot.status);
        self.host = Some(host);
        Ok(())
    }

    // -- Leave --------------------------------------------------------------

    /// Leave the current room.
    ///
    /// The server round trip completes (or fails) before local state is
    /// torn down; a failure is logged and the leave still succeeds
    /// locally. Returns `NoActiveRoom` when not in a room, which is
    /// harmless.
    pub async fn leave_room(&mut self) -> Result<(), RoomError> {
        let Some(code) = self.sync.room_code().cloned() else {
            return Err(RoomError::NoActiveRoom);
        };
        if let Err(e) = self
            .transport
            .send(RoomRequest::LeaveRoom { code: code.clone() })
            .await
        {
            warn!(room_code = %code, error = %e, "leave round trip failed, leaving locally");
        }
        self.teardown();
        info!(room_code = %code, "left room");
        self.emit(RoomEvent::RoomLeft { room_code: code });
        Ok(())
    }

    async fn leave_if_in_room(&mut self) {
        if self.sync.snapshot().is_some() {
            let _ = self.leave_room().await;
        }
    }

    fn teardown(&mut self) {
        if let Some(code) = self.own_code.take() {
            self.registry.release(&code);
        }
        self.host = None;
        self.sync.clear();
        self.state = LocalState::NoRoom;
    }

    /// Close the room locally without a server round trip.
    pub fn force_close(&mut self, reason: RoomCloseReason) {
        let Some(code) = self.sync.room_code().cloned() else {
            return;
        };
        self.teardown();
        warn!(room_code = %code, ?reason, "room closed");
        self.emit(RoomEvent::RoomClosed {
            room_code: code,
            reason,
        });
    }

    // -- Host operations ----------------------------------------------------

    /// Every reason the game cannot start right now, plus warnings.
    pub fn validate_game_start(&self) -> GameStartCheck {
        let ctx = StartContext {
            now_ms: self.now(),
            min_players: self.config.min_players,
            start_cost: self.config.start_cost,
            can_afford: self.energy.can_afford(self.config.start_cost),
        };
        match &self.host {
            Some(host) => host.validate_game_start(self.sync.snapshot(), ctx),
            None => GameStartCheck {
                errors: vec![StartBlocker::NoActiveRoom],
                warnings: Vec::new(),
            },
        }
    }

    /// Start the game. Returns the advisory warnings (for example players
    /// that are not ready) on success.
    pub async fn start_game(&mut self) -> Result<Vec<StartWarning>, RoomError> {
        let check = self.validate_game_start();
        if let Some(&blocker) = check.errors.first() {
            debug!(?check.errors, "game start blocked");
            return Err(blocker.into());
        }
        let code = self.current_code()?;

        match self
            .transport
            .send(RoomRequest::StartGame { code: code.clone() })
            .await?
        {
            RoomResponse::Snapshot { snapshot } => match self.apply_authoritative(snapshot) {
                ApplyOutcome::Applied { .. } => {}
                ApplyOutcome::Invalid(e) => {
                    let _ = self.request_state_sync().await;
                    return Err(RoomError::Protocol(ProtocolError::InvariantViolation(e)));
                }
                outcome => {
                    debug!(?outcome, "start answer not applied, resyncing");
                    let _ = self.request_state_sync().await;
                    return Err(RoomError::UnexpectedResponse("StartGame"));
                }
            },
            RoomResponse::Ack => {
                self.sync.apply_status(&code, RoomStatus::Starting);
                self.after_snapshot_change();
            }
            RoomResponse::Rejected { reason, message } => {
                let _ = self.request_state_sync().await;
                return Err(rejection(reason, message, &code));
            }
        }

        self.energy.consume(self.config.start_cost);
        info!(room_code = %code, "game starting");
        self.emit(RoomEvent::GameStarting {
            warnings: check.warnings.clone(),
        });
        Ok(check.warnings)
    }

    /// Hand host privileges to `target`.
    ///
    /// The local snapshot and permissions flip together before the request
    /// goes out; a refusal triggers a full re-sync.
    pub async fn transfer_host(&mut self, target: PlayerId) -> Result<(), RoomError> {
        let (Some(host), Some(snapshot)) = (self.host.as_mut(), self.sync.snapshot_mut()) else {
            return Err(RoomError::NoActiveRoom);
        };
        host.transfer_host_to(snapshot, target)?;
        let code = snapshot.room_code.clone();

        let op = self.sync.begin_operation("transfer-host", self.now());
        self.emit(RoomEvent::HostChanged {
            room_code: code.clone(),
            new_host_id: target,
        });
        self.after_snapshot_change();

        self.send_optimistic(op, RoomRequest::TransferHost { code, target })
            .await
    }

    /// Remove `target` from the room.
    pub async fn kick_player(&mut self, target: PlayerId) -> Result<(), RoomError> {
        let Some(host) = &self.host else {
            return Err(RoomError::NoActiveRoom);
        };
        if !host.permissions().kick_players {
            return Err(RoomError::PermissionDenied("kick-players"));
        }
        if target == self.identity.player_id {
            return Err(RoomError::TargetIsSelf);
        }
        let snapshot = self.sync.snapshot_mut().ok_or(RoomError::NoActiveRoom)?;
        if snapshot.remove_player(target).is_none() {
            return Err(RoomError::NotAMember(target));
        }
        let code = snapshot.room_code.clone();

        let op = self.sync.begin_operation("kick-player", self.now());
        info!(room_code = %code, %target, "kicking player");
        self.emit(RoomEvent::PlayerLeft { player_id: target });

        self.send_optimistic(op, RoomRequest::KickPlayer { code, target })
            .await
    }

    /// Set the local player's ready flag. Applied locally at once.
    pub async fn set_ready(&mut self, ready: bool) -> Result<(), RoomError> {
        let local = self.identity.player_id;
        let snapshot = self.sync.snapshot_mut().ok_or(RoomError::NoActiveRoom)?;
        if !snapshot.set_ready(local, ready) {
            return Err(RoomError::NotAMember(local));
        }
        let code = snapshot.room_code.clone();
        let player = snapshot.player(local).cloned();

        let op = self.sync.begin_operation("set-ready", self.now());
        if let Some(player) = player {
            self.emit(RoomEvent::PlayerUpdated { player });
        }

        self.send_optimistic(op, RoomRequest::SetReady { code, ready })
            .await
    }

    /// Send the request behind optimistic operation `op`.
    ///
    /// A snapshot answer settles it immediately. An `Ack` leaves it
    /// pending until the next snapshot. A refusal or transport failure
    /// drops it and re-syncs, so local guesses never outlive the server's
    /// answer.
    async fn send_optimistic(&mut self, op: u64, request: RoomRequest) -> Result<(), RoomError> {
        let kind = request.kind();
        let code = request.room_code().clone();
        match self.transport.send(request).await {
            Ok(RoomResponse::Snapshot { snapshot }) => {
                self.apply_authoritative(snapshot);
                Ok(())
            }
            Ok(RoomResponse::Ack) => Ok(()),
            Ok(RoomResponse::Rejected { reason, message }) => {
                warn!(room_code = %code, request = kind, %reason, "optimistic change refused");
                self.sync.confirm(op);
                let _ = self.request_state_sync().await;
                Err(rejection(reason, message, &code))
            }
            Err(e) => {
                self.sync.confirm(op);
                let _ = self.request_state_sync().await;
                Err(e.into())
            }
        }
    }

    fn current_code(&self) -> Result<RoomCode, RoomError> {
        self.sync.room_code().cloned().ok_or(RoomError::NoActiveRoom)
    }

    // -- Server pushes -------------------------------------------------------

    /// React to an unsolicited server message.
    pub async fn handle_push(&mut self, push: RoomPush) {
        if self.sync.room_code() != Some(push.room_code()) {
            debug!(room_code = %push.room_code(), "push for another room ignored");
            return;
        }
        let local = self.identity.player_id;

        match push {
            RoomPush::Snapshot { snapshot } => {
                let started = Instant::now();
                let outcome = self.sync.apply_snapshot(snapshot, self.now());
                self.check_budget("apply-snapshot", started);
                self.on_apply_outcome(outcome).await;
            }
            RoomPush::PlayerJoined { room_code, player } => {
                if self.sync.apply_player_joined(&room_code, player.clone()) {
                    self.emit(RoomEvent::PlayerJoined { player });
                }
            }
            RoomPush::PlayerLeft {
                player_id,
                ..
            } if player_id == local => {
                self.force_close(RoomCloseReason::Kicked);
            }
            RoomPush::PlayerLeft {
                room_code,
                player_id,
            } => {
                let departed_host = self
                    .sync
                    .snapshot()
                    .is_some_and(|s| s.host_player_id == player_id);
                if departed_host {
                    self.on_host_departed(room_code, player_id);
                } else if self.sync.apply_player_left(&room_code, player_id) {
                    self.emit(RoomEvent::PlayerLeft { player_id });
                }
            }
            RoomPush::PlayerUpdated { room_code, player } => {
                if self.sync.apply_player_updated(&room_code, player.clone()) {
                    self.emit(RoomEvent::PlayerUpdated { player });
                }
            }
            RoomPush::HostChanged {
                room_code,
                new_host_id,
            } => {
                if self.sync.apply_host_changed(&room_code, new_host_id) {
                    self.emit(RoomEvent::HostChanged {
                        room_code,
                        new_host_id,
                    });
                    self.after_snapshot_change();
                }
            }
            RoomPush::RoomClosed { reason, .. } => {
                self.force_close(RoomCloseReason::Server(reason));
            }
        }
    }

    /// The host left: promote the next player locally and wait for the
    /// server to confirm.
    fn on_host_departed(&mut self, room_code: RoomCode, departed: PlayerId) {
        let (Some(host), Some(snapshot)) = (self.host.as_mut(), self.sync.snapshot_mut()) else {
            return;
        };
        match host.handle_host_disconnection(snapshot, departed) {
            Some(new_host_id) => {
                self.sync.begin_operation("host-succession", self.clock.now_millis());
                self.emit(RoomEvent::PlayerLeft {
                    player_id: departed,
                });
                self.emit(RoomEvent::HostChanged {
                    room_code,
                    new_host_id,
                });
                self.after_snapshot_change();
            }
            None => self.force_close(RoomCloseReason::NoSuccessor),
        }
    }

    async fn on_apply_outcome(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied { version } => {
                self.emit(RoomEvent::SnapshotApplied { version });
                self.after_snapshot_change();
            }
            ApplyOutcome::Stale { version, current } => {
                self.emit(RoomEvent::StaleSnapshotDropped { version, current });
            }
            ApplyOutcome::Conflict {
                kind,
                local_version,
                incoming_version,
            } => {
                self.emit(RoomEvent::ConflictDetected {
                    kind,
                    local_version,
                    incoming_version,
                });
                let _ = self.request_state_sync().await;
            }
            ApplyOutcome::Invalid(_) => {
                let _ = self.request_state_sync().await;
            }
            ApplyOutcome::WrongRoom => {}
        }
    }

    /// Bring host authority and local state in line with the snapshot.
    fn after_snapshot_change(&mut self) {
        let Some(snapshot) = self.sync.snapshot() else {
            return;
        };
        if snapshot.status == RoomStatus::Closed {
            self.force_close(RoomCloseReason::Closed);
            return;
        }
        let status = snapshot.status;
        let Some(host) = self.host.as_mut() else {
            return;
        };
        host.refresh(snapshot);
        let is_host = host.is_host();
        if is_host != self.state.is_hosting() {
            self.emit(RoomEvent::HostStatusChanged { is_host });
        }
        self.state = LocalState::in_room(is_host, status);
    }

    fn apply_authoritative(&mut self, snapshot: RoomSnapshot) -> ApplyOutcome {
        let outcome = self.sync.apply_authoritative(snapshot);
        if let ApplyOutcome::Applied { version } = outcome {
            self.emit(RoomEvent::SnapshotApplied { version });
            self.after_snapshot_change();
        }
        outcome
    }

    fn check_budget(&self, operation: &'static str, started: Instant) {
        if let Some(elapsed) = self.sync.check_budget(operation, started.elapsed()) {
            self.emit(RoomEvent::PerformanceWarning { operation, elapsed });
        }
    }

    // -- Sync and periodic checks -------------------------------------------

    /// Fetch the authoritative snapshot and replace local state with it.
    ///
    /// A no-op while another sync is in flight.
    pub async fn request_state_sync(&mut self) -> Result<(), RoomError> {
        let code = self.current_code()?;
        if !self.sync.begin_sync() {
            return Ok(());
        }
        self.emit(RoomEvent::ResyncRequested);

        let started = Instant::now();
        let result = self
            .transport
            .send(RoomRequest::RequestStateSync { code: code.clone() })
            .await;
        self.check_budget("state-sync", started);

        match result {
            Ok(RoomResponse::Snapshot { snapshot }) => match self.apply_authoritative(snapshot) {
                ApplyOutcome::Applied { .. } | ApplyOutcome::Stale { .. } => Ok(()),
                ApplyOutcome::Invalid(e) => Err(ProtocolError::InvariantViolation(e).into()),
                ApplyOutcome::WrongRoom | ApplyOutcome::Conflict { .. } => {
                    Err(RoomError::UnexpectedResponse("RequestStateSync"))
                }
            },
            Ok(RoomResponse::Rejected {
                reason: RejectReason::RoomNotFound,
                ..
            }) => {
                self.sync.sync_failed();
                self.force_close(RoomCloseReason::Closed);
                Err(RoomError::RoomNotFound(code))
            }
            Ok(RoomResponse::Rejected { reason, message }) => {
                self.sync.sync_failed();
                Err(rejection(reason, message, &code))
            }
            Ok(RoomResponse::Ack) => {
                self.sync.sync_failed();
                Err(RoomError::UnexpectedResponse("RequestStateSync"))
            }
            Err(e) => {
                self.sync.sync_failed();
                debug!(room_code = %code, error = %e, "state sync failed");
                self.emit(RoomEvent::SyncFailed {
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Close the room if it has expired. Returns `true` when it did.
    pub fn check_expiry(&mut self) -> bool {
        let now = self.now();
        let expired = self.sync.snapshot().is_some_and(|s| s.is_expired(now));
        if expired {
            self.force_close(RoomCloseReason::Expired);
        }
        expired
    }

    /// One synchronizer health pass: report connection loss, re-sync on
    /// backlog, and proactively re-sync while idle.
    pub async fn health_check(&mut self) -> HealthReport {
        let now = self.now();
        self.limiter.prune(now);
        let report = self.sync.health_check(now, self.transport.is_connected());

        if report.connection_lost {
            self.emit(RoomEvent::ConnectionLost);
        }
        if report.backlog_exceeded {
            self.emit(RoomEvent::BacklogExceeded {
                pending: report.backlog,
            });
        }
        if report.should_request_sync {
            let _ = self.request_state_sync().await;
        }
        report
    }

    /// What the reconnection coordinator should remember.
    pub fn recovery_state(&self) -> RecoveryState {
        RecoveryState::new(self.sync.room_code().cloned(), self.now())
    }

    /// The transport is back: re-fetch the room.
    pub async fn on_reconnected(&mut self) {
        if self.sync.snapshot().is_some() {
            let _ = self.request_state_sync().await;
        }
    }
}

/// Map a server refusal onto the matching error.
fn rejection(reason: RejectReason, message: String, code: &RoomCode) -> RoomError {
    match reason {
        RejectReason::RoomNotFound => RoomError::RoomNotFound(code.clone()),
        RejectReason::RoomFull => RoomError::RoomFull(code.clone()),
        RejectReason::NotHost => RoomError::NotHost,
        reason => RoomError::ServerRejected { reason, message },
    }
}
