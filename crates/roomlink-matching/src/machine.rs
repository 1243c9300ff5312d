//! The matching state machine.
//!
//! Every transition goes through one checked path: look the edge up in
//! the table, update the state-scoped fields, replace the state timer,
//! persist, and emit. An illegal edge changes nothing and raises
//! [`MatchingEvent::TransitionFailed`]; the caller gets `false`.
//!
//! Transient states carry a single-shot timeout:
//!
//! | State       | Budget                       | On expiry              |
//! |-------------|------------------------------|------------------------|
//! | `Searching` | caller's max wait            | `Failed("Search timeout")` |
//! | `Found`     | `found_timeout` (30 s)       | `Failed("Found timeout")`  |
//! | `Starting`  | `starting_timeout` (15 s)    | `Failed("Start timeout")`  |
//!
//! Leaving a state aborts its timer. A callback that was already running
//! when it got replaced sees a different generation or state and does
//! nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use roomlink_protocol::{Codec, JsonCodec, PlayerId, RoomCode};
use roomlink_runtime::{EventBus, SharedClock, Subscription, TimerSlot};
use roomlink_session::KeyValueStore;
use tracing::{debug, info, warn};

use crate::{GameMode, MatchState, MatchType, MatchingConfig, MatchingError, MatchingSessionState};

/// Events raised by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchingEvent {
    StateChanged { from: MatchState, to: MatchState },
    /// An edge not in the table was requested. State is unchanged.
    TransitionFailed {
        from: MatchState,
        to: MatchState,
        reason: String,
    },
    /// `state`'s budget ran out. A transition to `Failed` follows.
    Timeout { state: MatchState, after: Duration },
    /// A pending state timeout was cancelled because the state moved on.
    TimeoutCancelled { state: MatchState },
    PlayerMatched { player_id: PlayerId },
    /// Restored state was transient and has been reset to `Idle`.
    StaleStateDiscarded { state: MatchState },
}

struct Inner {
    session: MatchingSessionState,
    timer: TimerSlot,
    /// Budget of the current `Searching` run.
    max_wait: Duration,
}

struct Shared {
    config: MatchingConfig,
    clock: SharedClock,
    store: Option<Arc<dyn KeyValueStore>>,
    events: EventBus<MatchingEvent>,
    inner: Mutex<Inner>,
}

/// Matching lifecycle with per-state timeouts. Clones share state.
#[derive(Clone)]
pub struct MatchingStateMachine {
    shared: Arc<Shared>,
}

impl MatchingStateMachine {
    /// A machine in `Idle` that does not persist.
    pub fn new(config: MatchingConfig, clock: SharedClock) -> Self {
        Self::build(config, clock, None)
    }

    /// A machine in `Idle` that persists every transition to `store`.
    ///
    /// Call [`restore`](Self::restore) to pick up the stored state.
    pub fn with_store(
        config: MatchingConfig,
        clock: SharedClock,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::build(config, clock, Some(store))
    }

    /// Load the persisted session state.
    ///
    /// A stored transient state (`Searching`, `Found`, `Starting`) belonged
    /// to a connection that no longer exists: it is reset to `Idle`,
    /// written back, and returned. Anything else is adopted as is.
    pub fn restore(&self) -> Result<Option<MatchState>, MatchingError> {
        let Some(store) = &self.shared.store else {
            return Ok(None);
        };
        let Some(blob) = store.load(&self.shared.config.storage_key)? else {
            return Ok(None);
        };
        let mut session: MatchingSessionState = JsonCodec.decode(&blob)?;

        let stale = session.current_state.is_transient().then_some(session.current_state);
        if let Some(state) = stale {
            warn!(%state, "discarding in-flight matching state from previous run");
            session.enter(MatchState::Idle, self.shared.clock.now_millis(), None);
        }

        let mut inner = self.lock();
        inner.timer.cancel();
        inner.session = session;
        if stale.is_some() {
            self.persist(&inner.session);
        }
        debug!(state = %inner.session.current_state, "matching state restored");
        drop(inner);

        if let Some(state) = stale {
            self.emit(MatchingEvent::StaleStateDiscarded { state });
        }
        Ok(stale)
    }

    fn build(
        config: MatchingConfig,
        clock: SharedClock,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let max_wait = config.default_max_wait;
        let events = EventBus::new(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                clock,
                store,
                events,
                inner: Mutex::new(Inner {
                    session: MatchingSessionState::default(),
                    timer: TimerSlot::new("matching"),
                    max_wait,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: MatchingEvent) {
        self.shared.events.emit(event);
    }

    // -- Queries ------------------------------------------------------------

    pub fn state(&self) -> MatchState {
        self.lock().session.current_state
    }

    /// A copy of the full session state.
    pub fn session(&self) -> MatchingSessionState {
        self.lock().session.clone()
    }

    pub fn subscribe(&self) -> Subscription<MatchingEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.shared.config
    }

    /// Whether a state timeout is pending.
    pub fn has_pending_timeout(&self) -> bool {
        self.lock().timer.is_armed()
    }

    // -- Operations ---------------------------------------------------------

    /// Begin searching (from `Idle`, or again from `Failed`).
    ///
    /// `max_wait` bounds the search; `None` uses the configured default.
    pub fn start_search(
        &self,
        mode: GameMode,
        match_type: MatchType,
        player_count: u8,
        max_wait: Option<Duration>,
    ) -> bool {
        let mut inner = self.lock();
        if !inner
            .session
            .current_state
            .can_transition_to(MatchState::Searching)
        {
            let from = inner.session.current_state;
            drop(inner);
            self.reject(from, MatchState::Searching);
            return false;
        }
        inner.session.selected_game_mode = mode;
        inner.session.match_type = match_type;
        inner.session.selected_player_count = player_count;
        inner.max_wait = max_wait.unwrap_or(self.shared.config.default_max_wait);
        self.apply(inner, MatchState::Searching, None)
    }

    /// Players were found. `room_code` is the room they meet in, when
    /// already known.
    pub fn match_found(&self, room_code: Option<RoomCode>) -> bool {
        let mut inner = self.lock();
        if inner.session.current_state == MatchState::Searching {
            inner.session.current_room_code = room_code;
        }
        self.transition_locked(inner, MatchState::Found, None)
    }

    /// Record a matched player. Arrival order is kept; duplicates are
    /// ignored. Only meaningful while `Searching` or `Found`.
    pub fn add_matched_player(&self, player_id: PlayerId) -> bool {
        let mut inner = self.lock();
        let state = inner.session.current_state;
        if !matches!(state, MatchState::Searching | MatchState::Found) {
            debug!(%player_id, %state, "matched player ignored outside search");
            return false;
        }
        if inner.session.matched_players.contains(&player_id) {
            return false;
        }
        inner.session.matched_players.push(player_id);
        self.persist(&inner.session);
        drop(inner);
        self.emit(MatchingEvent::PlayerMatched { player_id });
        true
    }

    /// The start confirmation arrived.
    pub fn begin_start(&self) -> bool {
        self.transition(MatchState::Starting, None)
    }

    /// The game started; matching is done.
    pub fn complete(&self) -> bool {
        self.transition(MatchState::Idle, None)
    }

    /// The user cancelled.
    pub fn cancel(&self) -> bool {
        self.transition(MatchState::Cancelled, None)
    }

    /// Fail with `reason`.
    pub fn fail(&self, reason: &str) -> bool {
        self.transition(MatchState::Failed, Some(reason))
    }

    /// Request any transition; checked against the table.
    pub fn transition(&self, target: MatchState, reason: Option<&str>) -> bool {
        let inner = self.lock();
        self.transition_locked(inner, target, reason)
    }

    /// Force `Idle` from any state, cancelling any timeout.
    pub fn reset(&self) {
        let inner = self.lock();
        if inner.session.current_state == MatchState::Idle {
            return;
        }
        self.apply(inner, MatchState::Idle, None);
    }

    /// The app came back to the foreground. A search that was running in
    /// the background is abandoned. Returns `true` if it was.
    pub fn on_app_resume(&self) -> bool {
        let inner = self.lock();
        if inner.session.current_state != MatchState::Searching {
            return false;
        }
        info!("app resumed while searching, resetting matching");
        self.apply(inner, MatchState::Idle, None)
    }

    // -- Internals ----------------------------------------------------------

    fn transition_locked(
        &self,
        inner: MutexGuard<'_, Inner>,
        target: MatchState,
        reason: Option<&str>,
    ) -> bool {
        let from = inner.session.current_state;
        if !from.can_transition_to(target) {
            drop(inner);
            self.reject(from, target);
            return false;
        }
        self.apply(inner, target, reason)
    }

    fn reject(&self, from: MatchState, to: MatchState) {
        warn!(%from, %to, "illegal matching transition");
        self.emit(MatchingEvent::TransitionFailed {
            from,
            to,
            reason: format!("no transition from {from} to {to}"),
        });
    }

    /// Perform a transition already known to be allowed.
    fn apply(&self, mut inner: MutexGuard<'_, Inner>, target: MatchState, reason: Option<&str>) -> bool {
        let from = inner.session.current_state;
        let cancelled = inner.timer.cancel();

        inner
            .session
            .enter(target, self.shared.clock.now_millis(), reason);

        let budget = match target {
            MatchState::Searching => Some(inner.max_wait),
            MatchState::Found => Some(self.shared.config.found_timeout),
            MatchState::Starting => Some(self.shared.config.starting_timeout),
            _ => None,
        };
        if let Some(after) = budget {
            let weak = Arc::downgrade(&self.shared);
            inner
                .timer
                .arm(after, move |generation| on_timeout(&weak, generation, target, after));
        }

        self.persist(&inner.session);
        drop(inner);

        if cancelled {
            self.emit(MatchingEvent::TimeoutCancelled { state: from });
        }
        info!(%from, to = %target, reason, "matching state changed");
        self.emit(MatchingEvent::StateChanged { from, to: target });
        true
    }

    fn persist(&self, session: &MatchingSessionState) {
        let Some(store) = &self.shared.store else {
            return;
        };
        let result = JsonCodec
            .encode(session)
            .map_err(MatchingError::from)
            .and_then(|blob| Ok(store.save(&self.shared.config.storage_key, blob)?));
        if let Err(e) = result {
            warn!(error = %e, "failed to persist matching state");
        }
    }
}

/// Timer callback: fail the state it was armed for, unless the machine
/// has moved on.
fn on_timeout(shared: &Weak<Shared>, generation: u64, state: MatchState, after: Duration) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let machine = MatchingStateMachine { shared };
    let mut inner = machine.lock();
    if inner.timer.generation() != generation || inner.session.current_state != state {
        debug!(%state, generation, "stale matching timeout ignored");
        return;
    }
    inner.timer.clear_if(generation);

    warn!(%state, after_ms = after.as_millis() as u64, "matching state timed out");
    machine.emit(MatchingEvent::Timeout { state, after });
    let reason = state.timeout_reason().unwrap_or("timeout");
    machine.transition_locked(inner, MatchState::Failed, Some(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomlink_runtime::ManualClock;

    fn machine() -> MatchingStateMachine {
        MatchingStateMachine::new(MatchingConfig::default(), ManualClock::new(0).shared())
    }

    #[tokio::test]
    async fn test_illegal_transition_returns_false_and_keeps_state() {
        let m = machine();
        let mut events = m.subscribe();

        assert!(!m.begin_start());
        assert_eq!(m.state(), MatchState::Idle);
        assert!(matches!(
            events.try_recv(),
            Some(MatchingEvent::TransitionFailed {
                from: MatchState::Idle,
                to: MatchState::Starting,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_add_matched_player_keeps_arrival_order() {
        let m = machine();
        m.start_search(GameMode::Quick, MatchType::QuickMatch, 3, None);
        assert!(m.add_matched_player(PlayerId(9)));
        assert!(m.add_matched_player(PlayerId(4)));
        assert!(!m.add_matched_player(PlayerId(9)));
        assert_eq!(m.session().matched_players, vec![PlayerId(9), PlayerId(4)]);
    }

    #[tokio::test]
    async fn test_add_matched_player_outside_search_ignored() {
        let m = machine();
        assert!(!m.add_matched_player(PlayerId(1)));
        assert!(m.session().matched_players.is_empty());
    }

    #[tokio::test]
    async fn test_reset_from_found_cancels_timeout() {
        let m = machine();
        m.start_search(GameMode::Classic, MatchType::PrivateRoom, 2, None);
        m.match_found(RoomCode::parse("4821").ok());
        assert!(m.has_pending_timeout());

        m.reset();

        assert_eq!(m.state(), MatchState::Idle);
        assert!(!m.has_pending_timeout());
        assert!(m.session().current_room_code.is_none());
    }
}
