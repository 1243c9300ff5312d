//! Session types: connection state, reconnection settings, and the
//! recovery snapshot taken when the connection drops.

use std::time::Duration;

use roomlink_protocol::RoomCode;
use roomlink_runtime::Backoff;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The local client's connection, as tracked by the
/// [`ReconnectionCoordinator`](crate::ReconnectionCoordinator).
///
/// ```text
///   Connected ──(lost)──→ Disconnected ──→ Reconnecting{1..=N} ──→ Connected
///                                                   │
///                                                   └──(N failures)──→ GaveUp
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Lost at `since_ms` (unix ms), no attempt running.
    Disconnected { since_ms: u64 },
    /// Waiting for, or running, attempt `attempt` (1-based).
    Reconnecting { attempt: u32 },
    /// Every attempt failed.
    GaveUp,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ---------------------------------------------------------------------------
// ReconnectConfig
// ---------------------------------------------------------------------------

/// Reconnection behaviour. Defaults: 5 attempts, 1s doubling to 30s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// When `false`, every attempt waits `initial_delay`.
    pub exponential_backoff: bool,
    /// Snapshot a [`RecoveryState`] when the connection drops.
    pub save_recovery_state: bool,
    /// Recovery state older than this is discarded instead of replayed.
    pub recovery_validity: Duration,
    /// Check the recovery state's age before handing it back.
    pub validate_recovery_state: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            exponential_backoff: true,
            save_recovery_state: true,
            recovery_validity: Duration::from_secs(5 * 60),
            validate_recovery_state: true,
        }
    }
}

impl ReconnectConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: self.initial_delay,
            max: self.max_delay,
            multiplier: self.backoff_multiplier,
            exponential: self.exponential_backoff,
        }
    }
}

// ---------------------------------------------------------------------------
// RecoveryState
// ---------------------------------------------------------------------------

/// What the client knew when the connection dropped.
///
/// Deliberately minimal: anything room-shaped is re-fetched from the
/// server after reconnecting rather than trusted from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryState {
    pub was_connected: bool,
    /// Last connection-quality sample, 0.0 (unusable) to 1.0 (perfect).
    pub connection_quality: f32,
    /// The room the client was in, if any.
    pub room_code: Option<RoomCode>,
    /// When this was captured (unix ms).
    pub saved_at_ms: u64,
}

impl RecoveryState {
    pub fn new(room_code: Option<RoomCode>, saved_at_ms: u64) -> Self {
        Self {
            was_connected: true,
            connection_quality: 1.0,
            room_code,
            saved_at_ms,
        }
    }

    pub fn age(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.saved_at_ms))
    }

    /// Whether the state is older than `validity` at `now_ms`.
    pub fn is_stale(&self, now_ms: u64, validity: Duration) -> bool {
        self.age(now_ms) > validity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default_backoff_schedule() {
        let b = ReconnectConfig::default().backoff();
        assert_eq!(b.delay_for(1), Duration::from_secs(1));
        assert_eq!(b.delay_for(5), Duration::from_secs(16));
    }

    #[test]
    fn test_recovery_state_is_stale_after_validity() {
        let state = RecoveryState::new(None, 1_000);
        let validity = Duration::from_secs(300);
        assert!(!state.is_stale(1_000 + 300_000, validity));
        assert!(state.is_stale(1_000 + 300_001, validity));
    }

    #[test]
    fn test_recovery_state_age_saturates_for_future_timestamp() {
        let state = RecoveryState::new(None, 5_000);
        assert_eq!(state.age(1_000), Duration::ZERO);
    }
}
