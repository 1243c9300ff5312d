//! Reconnection with exponential backoff and state recovery.
//!
//! When the transport drops, [`ReconnectionCoordinator::on_connection_lost`]
//! starts one background task that retries `connect()`:
//!
//! ```text
//! lost ─► wait delay(1) ─► connect ─┬─ ok ──► Succeeded { recovered }
//!                                   └─ err ─► AttemptFailed ─► wait delay(2) ─► ...
//!                                                              ... ─► MaxAttemptsReached
//! ```
//!
//! `delay(n) = min(max_delay, initial_delay * multiplier^(n-1))`.
//!
//! A pending wait can be cut short by
//! [`ReconnectionCoordinator::on_app_foreground`]: the app coming back to
//! the foreground is the best hint that the network is back, so the next
//! attempt runs immediately.
//!
//! Everything is reported as [`ReconnectEvent`]s; nothing here touches
//! room state. The room layer listens for `Succeeded` and re-fetches the
//! authoritative snapshot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use roomlink_runtime::{EventBus, SharedClock, Subscription};
use roomlink_transport::Transport;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ConnectionState, ReconnectConfig, RecoveryState};

/// Progress of a reconnection run.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectEvent {
    /// A run started. `recovery_saved` says whether a recovery snapshot
    /// was kept.
    Started { recovery_saved: bool },
    /// Attempt `attempt` is about to call `connect()`.
    AttemptStarted { attempt: u32, waited: Duration },
    /// One attempt failed; more may follow.
    AttemptFailed { attempt: u32, error: String },
    /// Connected again. `recovered` is the validated recovery snapshot.
    Succeeded {
        attempt: u32,
        recovered: Option<RecoveryState>,
    },
    /// The recovery snapshot was too old to use.
    RecoveryStateDiscarded { age: Duration },
    /// Every attempt failed. Terminal until the next trigger.
    MaxAttemptsReached { attempts: u32 },
    /// The run was cancelled.
    Cancelled,
}

struct Inner {
    state: ConnectionState,
    recovery: Option<RecoveryState>,
    task: Option<JoinHandle<()>>,
    /// Per-run wake signal; a fresh one per run so a stale permit from a
    /// finished run never shortens the next run's first wait.
    wake: Option<Arc<Notify>>,
    run: u64,
}

struct Shared<T> {
    transport: Arc<T>,
    config: ReconnectConfig,
    clock: SharedClock,
    events: EventBus<ReconnectEvent>,
    inner: Mutex<Inner>,
}

impl<T> Shared<T> {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives reconnect attempts for one transport.
///
/// Cheap to clone; clones share the same run.
pub struct ReconnectionCoordinator<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ReconnectionCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> ReconnectionCoordinator<T> {
    pub fn new(transport: Arc<T>, config: ReconnectConfig, clock: SharedClock) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                clock,
                events: EventBus::default(),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Connected,
                    recovery: None,
                    task: None,
                    wake: None,
                    run: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner().state
    }

    /// Whether a run is in progress.
    pub fn is_reconnecting(&self) -> bool {
        self.shared.inner().task.is_some()
    }

    pub fn subscribe(&self) -> Subscription<ReconnectEvent> {
        self.shared.events.subscribe()
    }

    /// Report a lost connection and start reconnecting.
    ///
    /// No-op (returns `false`) while a run is already in progress or after
    /// a run gave up; use [`retry`](Self::retry) or
    /// [`on_app_foreground`](Self::on_app_foreground) to start over.
    pub fn on_connection_lost(&self, recovery: Option<RecoveryState>) -> bool {
        let mut inner = self.shared.inner();
        if inner.task.is_some() || inner.state == ConnectionState::GaveUp {
            debug!(state = ?inner.state, "connection loss already being handled");
            return false;
        }
        self.start_run(&mut inner, recovery);
        true
    }

    /// Start a fresh run after giving up. No-op while a run is in progress.
    pub fn retry(&self, recovery: Option<RecoveryState>) -> bool {
        let mut inner = self.shared.inner();
        if inner.task.is_some() {
            return false;
        }
        self.start_run(&mut inner, recovery);
        true
    }

    /// The app regained focus.
    ///
    /// While a run is waiting out its backoff, the next attempt fires
    /// now. After giving up, a new run starts (reusing any saved recovery
    /// state). Otherwise nothing happens. Returns whether anything did.
    pub fn on_app_foreground(&self) -> bool {
        let mut inner = self.shared.inner();
        if inner.task.is_some() {
            if let Some(wake) = &inner.wake {
                info!("app foregrounded, attempting reconnect now");
                wake.notify_one();
                return true;
            }
            return false;
        }
        if inner.state == ConnectionState::GaveUp {
            let recovery = inner.recovery.take();
            self.start_run(&mut inner, recovery);
            return true;
        }
        false
    }

    /// The transport reconnected by other means (e.g. the user retried).
    /// Cancels any run without emitting `Cancelled`.
    pub fn mark_connected(&self) {
        let mut inner = self.shared.inner();
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.wake = None;
        inner.recovery = None;
        inner.state = ConnectionState::Connected;
    }

    /// Stop the current run. Idempotent; emits `Cancelled` only when a run
    /// was actually stopped.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.inner();
        let Some(task) = inner.task.take() else {
            return false;
        };
        task.abort();
        inner.wake = None;
        inner.state = ConnectionState::Disconnected {
            since_ms: self.shared.clock.now_millis(),
        };
        drop(inner);
        info!("reconnection cancelled");
        self.shared.events.emit(ReconnectEvent::Cancelled);
        true
    }

    fn start_run(&self, inner: &mut Inner, recovery: Option<RecoveryState>) {
        let now = self.shared.clock.now_millis();
        inner.recovery = recovery.filter(|_| self.shared.config.save_recovery_state);
        inner.state = ConnectionState::Disconnected { since_ms: now };
        inner.run += 1;
        let wake = Arc::new(Notify::new());
        inner.wake = Some(Arc::clone(&wake));

        let recovery_saved = inner.recovery.is_some();
        warn!(
            max_attempts = self.shared.config.max_attempts,
            recovery_saved, "connection lost, reconnecting"
        );
        self.shared
            .events
            .emit(ReconnectEvent::Started { recovery_saved });

        // Spawned while holding the lock, so the task cannot observe a
        // half-started run.
        inner.task = Some(tokio::spawn(run(
            Arc::clone(&self.shared),
            inner.run,
            wake,
        )));
    }
}

/// One reconnection run.
async fn run<T: Transport>(shared: Arc<Shared<T>>, run_id: u64, wake: Arc<Notify>) {
    let backoff = shared.config.backoff();
    let max_attempts = shared.config.max_attempts;

    for attempt in 1..=max_attempts {
        let delay = backoff.delay_for(attempt);
        set_state(&shared, run_id, ConnectionState::Reconnecting { attempt });

        let started = tokio::time::Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {
                debug!(attempt, "backoff cut short");
            }
        }
        let waited = started.elapsed();
        shared
            .events
            .emit(ReconnectEvent::AttemptStarted { attempt, waited });

        match shared.transport.connect().await {
            Ok(()) => {
                finish_success(&shared, run_id, attempt);
                return;
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "reconnect attempt failed");
                shared.events.emit(ReconnectEvent::AttemptFailed {
                    attempt,
                    error: e.to_string(),
                });
            }
        }
    }

    {
        let mut inner = shared.inner();
        if inner.run != run_id {
            return;
        }
        inner.state = ConnectionState::GaveUp;
        inner.task = None;
        inner.wake = None;
    }
    warn!(attempts = max_attempts, "reconnection gave up");
    shared.events.emit(ReconnectEvent::MaxAttemptsReached {
        attempts: max_attempts,
    });
}

fn set_state<T>(shared: &Shared<T>, run_id: u64, state: ConnectionState) {
    let mut inner = shared.inner();
    if inner.run == run_id {
        inner.state = state;
    }
}

fn finish_success<T>(shared: &Shared<T>, run_id: u64, attempt: u32) {
    let now = shared.clock.now_millis();
    let recovery = {
        let mut inner = shared.inner();
        if inner.run != run_id {
            return;
        }
        inner.state = ConnectionState::Connected;
        inner.task = None;
        inner.wake = None;
        inner.recovery.take()
    };

    let recovered = match recovery {
        Some(state)
            if shared.config.validate_recovery_state
                && state.is_stale(now, shared.config.recovery_validity) =>
        {
            let age = state.age(now);
            info!(age_secs = age.as_secs(), "recovery state too old, discarding");
            shared
                .events
                .emit(ReconnectEvent::RecoveryStateDiscarded { age });
            None
        }
        other => other,
    };

    info!(attempt, recovered = recovered.is_some(), "reconnected");
    shared
        .events
        .emit(ReconnectEvent::Succeeded { attempt, recovered });
}
