//! Matching state machine: timeouts, transition table, persistence.

use std::sync::Arc;
use std::time::Duration;

use roomlink_matching::{
    GameMode, MatchState, MatchType, MatchingConfig, MatchingEvent, MatchingSessionState,
    MatchingStateMachine,
};
use roomlink_protocol::{PlayerId, RoomCode};
use roomlink_runtime::ManualClock;
use roomlink_session::{KeyValueStore, MemoryStore};

const KEY: &str = "roomlink.matching";

fn machine() -> MatchingStateMachine {
    MatchingStateMachine::new(MatchingConfig::default(), ManualClock::new(1_000).shared())
}

fn stored_machine(store: &MemoryStore) -> MatchingStateMachine {
    MatchingStateMachine::with_store(
        MatchingConfig::default(),
        ManualClock::new(1_000).shared(),
        Arc::new(store.clone()),
    )
}

fn search(m: &MatchingStateMachine, max_wait: Duration) -> bool {
    m.start_search(GameMode::Quick, MatchType::QuickMatch, 2, Some(max_wait))
}

fn stored_session(store: &MemoryStore) -> MatchingSessionState {
    let blob = store.load(KEY).unwrap().expect("state persisted");
    serde_json::from_slice(&blob).unwrap()
}

fn timeouts(events: &[MatchingEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, MatchingEvent::Timeout { .. }))
        .count()
}

async fn sleep(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_search_timeout_fires_once_and_fails() {
    let m = machine();
    let mut events = m.subscribe();
    assert!(search(&m, Duration::from_secs(30)));

    sleep(29).await;
    assert_eq!(m.state(), MatchState::Searching);

    sleep(2).await;
    assert_eq!(m.state(), MatchState::Failed);
    assert_eq!(
        m.session().last_error_message.as_deref(),
        Some("Search timeout")
    );

    sleep(120).await;
    let events = events.drain();
    assert_eq!(timeouts(&events), 1);
    assert_eq!(
        events.last(),
        Some(&MatchingEvent::StateChanged {
            from: MatchState::Searching,
            to: MatchState::Failed,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_match_found_before_timeout_cancels_search_timer() {
    let m = machine();
    let mut events = m.subscribe();
    search(&m, Duration::from_secs(30));

    sleep(20).await;
    assert!(m.match_found(RoomCode::parse("4821").ok()));

    // Past the original search deadline: nothing fires into Found.
    sleep(15).await;
    assert_eq!(m.state(), MatchState::Found);

    let events = events.drain();
    assert_eq!(timeouts(&events), 0);
    assert!(events.contains(&MatchingEvent::TimeoutCancelled {
        state: MatchState::Searching
    }));
}

#[tokio::test(start_paused = true)]
async fn test_found_times_out_after_thirty_seconds() {
    let m = machine();
    search(&m, Duration::from_secs(60));
    m.match_found(None);

    sleep(29).await;
    assert_eq!(m.state(), MatchState::Found);
    sleep(2).await;

    assert_eq!(m.state(), MatchState::Failed);
    assert_eq!(
        m.session().last_error_message.as_deref(),
        Some("Found timeout")
    );
}

#[tokio::test(start_paused = true)]
async fn test_starting_times_out_after_fifteen_seconds() {
    let m = machine();
    search(&m, Duration::from_secs(60));
    m.match_found(None);
    assert!(m.begin_start());

    sleep(16).await;

    assert_eq!(m.state(), MatchState::Failed);
    assert_eq!(
        m.session().last_error_message.as_deref(),
        Some("Start timeout")
    );
}

#[tokio::test(start_paused = true)]
async fn test_complete_from_starting_returns_idle_without_timeout() {
    let m = machine();
    let mut events = m.subscribe();
    search(&m, Duration::from_secs(60));
    m.add_matched_player(PlayerId(7));
    m.match_found(None);
    m.begin_start();

    assert!(m.complete());
    sleep(60).await;

    assert_eq!(m.state(), MatchState::Idle);
    assert!(m.session().matched_players.is_empty());
    assert!(!m.has_pending_timeout());
    assert_eq!(timeouts(&events.drain()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_default_max_wait_used_when_none_given() {
    let config = MatchingConfig {
        default_max_wait: Duration::from_secs(10),
        ..Default::default()
    };
    let m = MatchingStateMachine::new(config, ManualClock::new(0).shared());
    m.start_search(GameMode::Party, MatchType::PrivateRoom, 4, None);

    sleep(11).await;
    assert_eq!(m.state(), MatchState::Failed);
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_cancel_during_search_emits_timeout_cancelled() {
    let m = machine();
    search(&m, Duration::from_secs(30));
    let mut events = m.subscribe();

    assert!(m.cancel());

    assert_eq!(m.state(), MatchState::Cancelled);
    assert_eq!(
        events.drain(),
        vec![
            MatchingEvent::TimeoutCancelled {
                state: MatchState::Searching
            },
            MatchingEvent::StateChanged {
                from: MatchState::Searching,
                to: MatchState::Cancelled,
            },
        ]
    );

    // Cancelled only leads back to Idle.
    assert!(!search(&m, Duration::from_secs(30)));
    assert!(m.transition(MatchState::Idle, None));
}

#[tokio::test]
async fn test_transition_rejects_every_pair_outside_table() {
    for from in MatchState::ALL {
        for to in MatchState::ALL {
            if from.can_transition_to(to) {
                continue;
            }
            let m = machine();
            // Walk a fresh machine to `from` along legal edges.
            let path: &[MatchState] = match from {
                MatchState::Idle => &[],
                MatchState::Searching => &[MatchState::Searching],
                MatchState::Found => &[MatchState::Searching, MatchState::Found],
                MatchState::Starting => &[
                    MatchState::Searching,
                    MatchState::Found,
                    MatchState::Starting,
                ],
                MatchState::Cancelled => &[MatchState::Searching, MatchState::Cancelled],
                MatchState::Failed => &[MatchState::Searching, MatchState::Failed],
            };
            for step in path {
                assert!(m.transition(*step, None));
            }
            let before = m.session();
            let mut events = m.subscribe();

            assert!(!m.transition(to, None), "{from} -> {to} accepted");
            assert_eq!(m.session(), before);
            assert!(matches!(
                events.try_recv(),
                Some(MatchingEvent::TransitionFailed { .. })
            ));
        }
    }
}

#[tokio::test]
async fn test_start_search_records_selection_and_estimate() {
    let m = machine();
    assert!(m.start_search(GameMode::Classic, MatchType::PrivateRoom, 4, None));

    let session = m.session();
    assert_eq!(session.selected_game_mode, GameMode::Classic);
    assert_eq!(session.match_type, MatchType::PrivateRoom);
    assert_eq!(session.selected_player_count, 4);
    assert_eq!(session.search_start_time, Some(1_000));
    assert_eq!(session.estimated_wait_time, Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_retry_from_failed_clears_previous_error() {
    let m = machine();
    search(&m, Duration::from_secs(30));
    m.fail("server unreachable");
    assert_eq!(
        m.session().last_error_message.as_deref(),
        Some("server unreachable")
    );

    assert!(search(&m, Duration::from_secs(30)));
    assert_eq!(m.session().last_error_message, None);
}

#[tokio::test]
async fn test_on_app_resume_resets_search_only() {
    let m = machine();
    search(&m, Duration::from_secs(30));
    assert!(m.on_app_resume());
    assert_eq!(m.state(), MatchState::Idle);
    assert!(!m.has_pending_timeout());

    search(&m, Duration::from_secs(30));
    m.match_found(None);
    assert!(!m.on_app_resume());
    assert_eq!(m.state(), MatchState::Found);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_every_transition_is_persisted() {
    let store = MemoryStore::new();
    let m = stored_machine(&store);

    search(&m, Duration::from_secs(30));
    assert_eq!(stored_session(&store).current_state, MatchState::Searching);

    m.add_matched_player(PlayerId(3));
    assert_eq!(stored_session(&store).matched_players, vec![PlayerId(3)]);

    m.cancel();
    assert_eq!(stored_session(&store).current_state, MatchState::Cancelled);
}

#[tokio::test]
async fn test_restore_discards_transient_state() {
    let store = MemoryStore::new();
    let previous = stored_machine(&store);
    search(&previous, Duration::from_secs(30));
    previous.match_found(RoomCode::parse("4821").ok());
    drop(previous);

    let m = stored_machine(&store);
    let mut events = m.subscribe();

    assert_eq!(m.restore().unwrap(), Some(MatchState::Found));
    assert_eq!(m.state(), MatchState::Idle);
    assert_eq!(m.session().current_room_code, None);
    assert_eq!(stored_session(&store).current_state, MatchState::Idle);
    assert_eq!(
        events.try_recv(),
        Some(MatchingEvent::StaleStateDiscarded {
            state: MatchState::Found
        })
    );
}

#[tokio::test]
async fn test_restore_keeps_settled_state() {
    let store = MemoryStore::new();
    let previous = stored_machine(&store);
    search(&previous, Duration::from_secs(30));
    previous.fail("no players");
    drop(previous);

    let m = stored_machine(&store);
    assert_eq!(m.restore().unwrap(), None);
    assert_eq!(m.state(), MatchState::Failed);
    assert_eq!(m.session().last_error_message.as_deref(), Some("no players"));
}

#[tokio::test]
async fn test_restore_with_empty_store_stays_idle() {
    let store = MemoryStore::new();
    let m = stored_machine(&store);
    assert_eq!(m.restore().unwrap(), None);
    assert_eq!(m.state(), MatchState::Idle);
}

#[tokio::test]
async fn test_restore_with_corrupt_blob_returns_error() {
    let store = MemoryStore::new();
    store.save(KEY, b"not json".to_vec()).unwrap();
    let m = stored_machine(&store);

    assert!(m.restore().is_err());
    assert_eq!(m.state(), MatchState::Idle);
}
