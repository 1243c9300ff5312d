//! Session actor: one Tokio task that owns the [`RoomSessionManager`].
//!
//! Every room mutation happens inside this task, so the snapshot, host
//! authority and synchronizer live on a single timeline with no locks.
//! The outside world talks to it through a cheap, cloneable
//! [`RoomSessionHandle`].
//!
//! Besides commands the loop serves:
//!
//! - server pushes from the transport,
//! - the expiry watchdog (paused while not in a room),
//! - the synchronizer health check,
//! - connection changes and reconnection events (a successful reconnect
//!   triggers a full state sync).

use roomlink_protocol::{PlayerId, RoomSnapshot};
use roomlink_runtime::{EventBus, Subscription, Ticker};
use roomlink_session::{ConnectionState, ReconnectEvent, ReconnectionCoordinator};
use roomlink_transport::Transport;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    EnergyLedger, HostPermissions, LocalState, RoomError, RoomEvent, RoomSessionManager,
    StartWarning,
};

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to the session actor.
pub(crate) enum SessionCommand {
    CreateRoom { max_players: u8, reply: Reply<RoomSnapshot> },
    JoinRoom { code: String, reply: Reply<RoomSnapshot> },
    LeaveRoom { reply: Reply<()> },
    StartGame { reply: Reply<Vec<StartWarning>> },
    TransferHost { target: PlayerId, reply: Reply<()> },
    KickPlayer { target: PlayerId, reply: Reply<()> },
    SetReady { ready: bool, reply: Reply<()> },
    RequestStateSync { reply: Reply<()> },
    GetInfo { reply: oneshot::Sender<SessionInfo> },
    Shutdown,
}

/// A copy of the session's current state.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub state: LocalState,
    pub snapshot: Option<RoomSnapshot>,
    pub is_host: bool,
    pub permissions: HostPermissions,
}

/// Handle to a running session actor.
#[derive(Clone)]
pub struct RoomSessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    events: EventBus<RoomEvent>,
}

impl RoomSessionHandle {
    async fn call<R>(
        &self,
        make: impl FnOnce(Reply<R>) -> SessionCommand,
    ) -> Result<R, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable)?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)?
    }

    pub async fn create_room(&self, max_players: u8) -> Result<RoomSnapshot, RoomError> {
        self.call(|reply| SessionCommand::CreateRoom { max_players, reply })
            .await
    }

    pub async fn join_room(&self, code: &str) -> Result<RoomSnapshot, RoomError> {
        let code = code.to_owned();
        self.call(|reply| SessionCommand::JoinRoom { code, reply }).await
    }

    pub async fn leave_room(&self) -> Result<(), RoomError> {
        self.call(|reply| SessionCommand::LeaveRoom { reply }).await
    }

    pub async fn start_game(&self) -> Result<Vec<StartWarning>, RoomError> {
        self.call(|reply| SessionCommand::StartGame { reply }).await
    }

    pub async fn transfer_host(&self, target: PlayerId) -> Result<(), RoomError> {
        self.call(|reply| SessionCommand::TransferHost { target, reply })
            .await
    }

    pub async fn kick_player(&self, target: PlayerId) -> Result<(), RoomError> {
        self.call(|reply| SessionCommand::KickPlayer { target, reply })
            .await
    }

    pub async fn set_ready(&self, ready: bool) -> Result<(), RoomError> {
        self.call(|reply| SessionCommand::SetReady { ready, reply })
            .await
    }

    pub async fn request_state_sync(&self) -> Result<(), RoomError> {
        self.call(|reply| SessionCommand::RequestStateSync { reply })
            .await
    }

    /// The session's current state.
    pub async fn info(&self) -> Result<SessionInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::GetInfo { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable)?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Subscribe to room events.
    pub fn subscribe(&self) -> Subscription<RoomEvent> {
        self.events.subscribe()
    }

    /// Stop the actor. Pending commands are dropped.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable)
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

struct SessionActor<T: Transport, E: EnergyLedger> {
    manager: RoomSessionManager<T, E>,
    reconnect: Option<ReconnectionCoordinator<T>>,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl<T: Transport, E: EnergyLedger> SessionActor<T, E> {
    async fn run(self) {
        let Self {
            mut manager,
            reconnect,
            mut receiver,
        } = self;
        let player_id = manager.identity().player_id;
        info!(%player_id, "room session started");

        let transport = manager.transport().clone();
        let mut pushes = transport.subscribe();
        let mut pushes_open = true;
        let mut connection = transport.watch_connection();
        let mut connection_open = true;
        let mut reconnect_events = reconnect.as_ref().map(ReconnectionCoordinator::subscribe);

        let mut watchdog = Ticker::every(manager.config().expiry_check_interval);
        let mut health = Ticker::every(manager.config().health_check_interval);

        loop {
            watchdog.set_active(manager.state().is_in_room());

            tokio::select! {
                cmd = receiver.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => handle_command(&mut manager, cmd).await,
                },

                push = pushes.recv(), if pushes_open => match push {
                    Ok(push) => manager.handle_push(push).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "session fell behind on pushes, resyncing");
                        let _ = manager.request_state_sync().await;
                    }
                    Err(RecvError::Closed) => pushes_open = false,
                },

                _ = watchdog.wait_for_tick() => {
                    manager.check_expiry();
                    watchdog.record_tick_end();
                }

                _ = health.wait_for_tick() => {
                    let report = manager.health_check().await;
                    if report.connection_lost {
                        if let Some(coordinator) = &reconnect {
                            coordinator.on_connection_lost(Some(manager.recovery_state()));
                        }
                    }
                    health.record_tick_end();
                }

                changed = connection.changed(), if connection_open => match changed {
                    Ok(()) => {
                        let up = *connection.borrow_and_update();
                        debug!(up, "transport connection changed");
                        if let Some(coordinator) = &reconnect {
                            if !up {
                                coordinator.on_connection_lost(Some(manager.recovery_state()));
                            } else if !coordinator.is_reconnecting()
                                && coordinator.state() != ConnectionState::Connected
                            {
                                // Back without a run. A run that got us here
                                // resyncs on its `Succeeded` event instead.
                                coordinator.mark_connected();
                                manager.on_reconnected().await;
                            }
                        }
                    }
                    Err(_) => connection_open = false,
                },

                Some(event) = next_reconnect_event(&mut reconnect_events) => {
                    if let ReconnectEvent::Succeeded { attempt, .. } = event {
                        info!(attempt, "reconnected, resyncing room");
                        manager.on_reconnected().await;
                    }
                }
            }
        }

        info!(%player_id, "room session stopped");
    }
}

async fn handle_command<T: Transport, E: EnergyLedger>(
    manager: &mut RoomSessionManager<T, E>,
    cmd: SessionCommand,
) {
    // A dropped reply receiver means the caller gave up waiting.
    match cmd {
        SessionCommand::CreateRoom { max_players, reply } => {
            let _ = reply.send(manager.create_room(max_players).await);
        }
        SessionCommand::JoinRoom { code, reply } => {
            let _ = reply.send(manager.join_room(&code).await);
        }
        SessionCommand::LeaveRoom { reply } => {
            let _ = reply.send(manager.leave_room().await);
        }
        SessionCommand::StartGame { reply } => {
            let _ = reply.send(manager.start_game().await);
        }
        SessionCommand::TransferHost { target, reply } => {
            let _ = reply.send(manager.transfer_host(target).await);
        }
        SessionCommand::KickPlayer { target, reply } => {
            let _ = reply.send(manager.kick_player(target).await);
        }
        SessionCommand::SetReady { ready, reply } => {
            let _ = reply.send(manager.set_ready(ready).await);
        }
        SessionCommand::RequestStateSync { reply } => {
            let _ = reply.send(manager.request_state_sync().await);
        }
        SessionCommand::GetInfo { reply } => {
            let _ = reply.send(SessionInfo {
                state: manager.state(),
                snapshot: manager.snapshot().cloned(),
                is_host: manager.is_host(),
                permissions: manager.permissions(),
            });
        }
        SessionCommand::Shutdown => {}
    }
}

async fn next_reconnect_event(
    events: &mut Option<Subscription<ReconnectEvent>>,
) -> Option<ReconnectEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Spawn the session actor and return a handle to it.
///
/// With a coordinator, connection loss (seen by the health check or the
/// transport's connection watch) starts reconnection, and a successful
/// reconnect re-fetches the room.
pub fn spawn_session<T: Transport, E: EnergyLedger>(
    manager: RoomSessionManager<T, E>,
    reconnect: Option<ReconnectionCoordinator<T>>,
) -> RoomSessionHandle {
    let (tx, rx) = mpsc::channel(manager.config().command_buffer.max(1));
    let events = manager.events();

    let actor = SessionActor {
        manager,
        reconnect,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    RoomSessionHandle { sender: tx, events }
}
