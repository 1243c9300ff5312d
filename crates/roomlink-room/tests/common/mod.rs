//! Shared fixtures: a scripted room server behind `MemoryTransport`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use roomlink_protocol::{
    PlayerId, PlayerInfo, RejectReason, RoomCode, RoomPush, RoomRequest, RoomResponse,
    RoomSnapshot, RoomStatus,
};
use roomlink_room::{
    CodeRegistryConfig, EnergyLedger, RoomCodeRegistry, RoomConfig, RoomSessionManager,
    UnlimitedEnergy,
};
use roomlink_runtime::{ManualClock, SharedClock};
use roomlink_session::LocalIdentity;
use roomlink_transport::MemoryTransport;

pub const LOCAL: PlayerId = PlayerId(2);

pub fn pid(n: u64) -> PlayerId {
    PlayerId(n)
}

pub fn code(raw: &str) -> RoomCode {
    RoomCode::parse(raw).unwrap()
}

pub fn local_identity() -> LocalIdentity {
    LocalIdentity::new(LOCAL, "bea")
}

/// Room lifetime handed out by the fake server.
pub const ROOM_TTL_MS: u64 = 30 * 60 * 1000;

#[derive(Default)]
struct ServerState {
    rooms: HashMap<RoomCode, RoomSnapshot>,
    /// Codes the server pretends are taken when a client proposes them.
    taken: Vec<RoomCode>,
    /// Number of upcoming `CreateRoom` requests answered with `CodeInUse`.
    reject_creates: u32,
    now_ms: u64,
    /// Rewrites the snapshot in the next answer to a request of this kind.
    tamper: Option<(&'static str, Tamper)>,
}

type Tamper = Box<dyn FnOnce(&mut RoomSnapshot) + Send>;

/// An in-memory stand-in for the room server. The local player is always
/// [`LOCAL`].
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    /// A connected transport answered by this server.
    pub fn transport(&self) -> MemoryTransport {
        let server = self.clone();
        MemoryTransport::with_responder(move |req| server.answer(req))
    }

    pub fn set_now(&self, now_ms: u64) {
        self.state().now_ms = now_ms;
    }

    pub fn reject_next_creates(&self, n: u32) {
        self.state().reject_creates = n;
    }

    /// Open a room hosted by `host`, with `others` joined after in order.
    pub fn seed_room(&self, raw: &str, host: PlayerId, others: &[PlayerId]) -> RoomCode {
        let code = code(raw);
        let mut state = self.state();
        let mut room = RoomSnapshot::new(
            code.clone(),
            PlayerInfo::new(host, format!("p{}", host.0)),
            4,
            state.now_ms,
            state.now_ms + ROOM_TTL_MS,
        );
        for &p in others {
            room.add_player(PlayerInfo::new(p, format!("p{}", p.0))).unwrap();
        }
        room.sync_version = 1;
        state.rooms.insert(code.clone(), room);
        code
    }

    pub fn room(&self, code: &RoomCode) -> Option<RoomSnapshot> {
        self.state().rooms.get(code).cloned()
    }

    /// Mutate a room server-side and bump its version. Returns the
    /// snapshot push a real server would send.
    pub fn update(&self, code: &RoomCode, f: impl FnOnce(&mut RoomSnapshot)) -> RoomPush {
        let mut state = self.state();
        let room = state.rooms.get_mut(code).unwrap();
        f(room);
        room.sync_version += 1;
        RoomPush::Snapshot {
            snapshot: room.clone(),
        }
    }

    /// Add a member server-side and return the `PlayerJoined` push.
    pub fn add_member(&self, code: &RoomCode, player: PlayerId) -> RoomPush {
        let info = PlayerInfo::new(player, format!("p{}", player.0));
        self.update(code, |room| room.add_player(info.clone()).unwrap());
        RoomPush::PlayerJoined {
            room_code: code.clone(),
            player: info,
        }
    }

    /// Alter what the next `kind` answer carries without touching the
    /// stored room.
    pub fn tamper_next(&self, kind: &'static str, f: impl FnOnce(&mut RoomSnapshot) + Send + 'static) {
        self.state().tamper = Some((kind, Box::new(f)));
    }

    fn answer(&self, req: &RoomRequest) -> RoomResponse {
        let mut response = self.handle(req);
        let tamper = {
            let mut state = self.state();
            match &state.tamper {
                Some((kind, _)) if *kind == req.kind() => state.tamper.take(),
                _ => None,
            }
        };
        if let (Some((_, f)), RoomResponse::Snapshot { snapshot }) = (tamper, &mut response) {
            f(snapshot);
        }
        response
    }

    fn handle(&self, req: &RoomRequest) -> RoomResponse {
        let mut state = self.state();
        let now = state.now_ms;
        match req {
            RoomRequest::CreateRoom { code, max_players } => {
                if state.reject_creates > 0 || state.taken.contains(code) || state.rooms.contains_key(code) {
                    state.reject_creates = state.reject_creates.saturating_sub(1);
                    return RoomResponse::rejected(RejectReason::CodeInUse, "taken");
                }
                let mut room = RoomSnapshot::new(
                    code.clone(),
                    PlayerInfo::new(LOCAL, "bea"),
                    *max_players,
                    now,
                    now + ROOM_TTL_MS,
                );
                room.sync_version = 1;
                state.rooms.insert(code.clone(), room.clone());
                RoomResponse::snapshot(room)
            }
            RoomRequest::JoinRoom { code } => {
                let Some(room) = state.rooms.get_mut(code) else {
                    return RoomResponse::rejected(RejectReason::RoomNotFound, "no such room");
                };
                if !room.contains(LOCAL) {
                    if room.is_full() {
                        return RoomResponse::rejected(RejectReason::RoomFull, "full");
                    }
                    room.add_player(PlayerInfo::new(LOCAL, "bea")).unwrap();
                    room.sync_version += 1;
                }
                RoomResponse::snapshot(room.clone())
            }
            RoomRequest::LeaveRoom { code } => {
                if let Some(room) = state.rooms.get_mut(code) {
                    if room.host_player_id == LOCAL {
                        state.rooms.remove(code);
                    } else {
                        room.remove_player(LOCAL);
                        room.sync_version += 1;
                    }
                }
                RoomResponse::Ack
            }
            RoomRequest::StartGame { code } => match state.rooms.get_mut(code) {
                Some(room) if room.host_player_id == LOCAL => {
                    room.transition_status(RoomStatus::Starting).unwrap();
                    room.sync_version += 1;
                    RoomResponse::snapshot(room.clone())
                }
                Some(_) => RoomResponse::rejected(RejectReason::NotHost, "not host"),
                None => RoomResponse::rejected(RejectReason::RoomNotFound, "gone"),
            },
            RoomRequest::TransferHost { code, target } => {
                let Some(room) = state.rooms.get_mut(code) else {
                    return RoomResponse::rejected(RejectReason::RoomNotFound, "gone");
                };
                room.set_host(*target).unwrap();
                room.sync_version += 1;
                RoomResponse::snapshot(room.clone())
            }
            RoomRequest::KickPlayer { code, target } => {
                if let Some(room) = state.rooms.get_mut(code) {
                    room.remove_player(*target);
                    room.sync_version += 1;
                }
                RoomResponse::Ack
            }
            RoomRequest::SetReady { code, ready } => {
                if let Some(room) = state.rooms.get_mut(code) {
                    room.set_ready(LOCAL, *ready);
                    room.sync_version += 1;
                }
                RoomResponse::Ack
            }
            RoomRequest::RequestStateSync { code } => match state.rooms.get(code) {
                Some(room) => RoomResponse::snapshot(room.clone()),
                None => RoomResponse::rejected(RejectReason::RoomNotFound, "gone"),
            },
        }
    }
}

pub struct Fixture<E: EnergyLedger = UnlimitedEnergy> {
    pub server: FakeServer,
    pub transport: MemoryTransport,
    pub clock: ManualClock,
    pub manager: RoomSessionManager<MemoryTransport, E>,
}

pub fn fixture() -> Fixture {
    fixture_with(RoomConfig::default(), UnlimitedEnergy)
}

pub fn fixture_with<E: EnergyLedger>(config: RoomConfig, energy: E) -> Fixture<E> {
    let server = FakeServer::new();
    let transport = server.transport();
    let clock = ManualClock::new(0);
    let shared: SharedClock = clock.shared();
    let registry = RoomCodeRegistry::new(CodeRegistryConfig::default(), shared.clone());
    let manager = RoomSessionManager::new(
        local_identity(),
        Arc::new(transport.clone()),
        Arc::new(energy),
        registry,
        config,
        shared,
    );
    Fixture {
        server,
        transport,
        clock,
        manager,
    }
}

/// Number of recorded requests of `kind`.
pub fn sent_of(transport: &MemoryTransport, kind: &str) -> usize {
    transport.sent().iter().filter(|r| r.kind() == kind).count()
}
