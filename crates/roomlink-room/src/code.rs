//! Room code registry: generation, TTLs, and the brute-force guard.
//!
//! Codes are four digits, `1000`–`9999`, minus a deny-list of memorable
//! patterns nobody should get by accident (`1111`, `1234`, `9876`, ...).
//!
//! ```text
//! generate() ──► Reserved (5 min) ──activate()──► Active (30 min)
//!                     │                               │
//!                     └──────── release() / expiry ───┴──► gone
//! ```
//!
//! There is no background timer: every operation first sweeps entries
//! whose TTL has passed.
//!
//! The registry also tracks failed join guesses **per identity**, not per
//! code, so cycling through codes does not reset the counter.
//!
//! All state sits behind one mutex; clones share it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use roomlink_protocol::{Codec, JsonCodec, RoomCode};
use roomlink_runtime::SharedClock;
use roomlink_session::KeyValueStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::RoomError;

/// Memorable codes denied on top of the digit patterns.
const CURATED_DENY_LIST: &[&str] = &["1000", "1004", "1212", "1313", "1337", "2000", "2580", "6969"];

// ---------------------------------------------------------------------------
// Config and records
// ---------------------------------------------------------------------------

/// Registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRegistryConfig {
    /// Lifetime of a generated code until the server confirms the room.
    pub reserved_ttl: Duration,
    /// Lifetime of a code backing a live room.
    pub active_ttl: Duration,
    /// Random draws before giving up with `CodeGenerationExhausted`.
    pub max_generation_attempts: u32,
    /// Failed guesses within `guess_tracking_window` that trigger a lockout.
    pub max_failed_guesses: u32,
    pub guess_tracking_window: Duration,
    pub lockout_duration: Duration,
}

impl Default for CodeRegistryConfig {
    fn default() -> Self {
        Self {
            reserved_ttl: Duration::from_secs(5 * 60),
            active_ttl: Duration::from_secs(30 * 60),
            max_generation_attempts: 100,
            max_failed_guesses: 5,
            guess_tracking_window: Duration::from_secs(10 * 60),
            lockout_duration: Duration::from_secs(5 * 60),
        }
    }
}

/// Whether a code is merely reserved or backs a live room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeState {
    Reserved,
    Active,
}

/// One code held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCodeRecord {
    pub code: RoomCode,
    pub state: CodeState,
    /// Unix ms after which the record is swept.
    pub expires_at: u64,
}

#[derive(Debug, Default)]
struct GuessRecord {
    failures: VecDeque<u64>,
    locked_until: Option<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    codes: HashMap<RoomCode, RoomCodeRecord>,
    guesses: HashMap<String, GuessRecord>,
}

impl Inner {
    fn sweep(&mut self, now: u64) {
        let before = self.codes.len();
        self.codes.retain(|_, r| r.expires_at > now);
        let swept = before - self.codes.len();
        if swept > 0 {
            debug!(swept, "expired room codes released");
        }
        self.guesses.retain(|_, g| {
            !g.failures.is_empty() || g.locked_until.is_some_and(|t| t > now)
        });
    }
}

// ---------------------------------------------------------------------------
// Deny-list
// ---------------------------------------------------------------------------

/// Whether `code` matches a denied pattern: all digits equal, a strictly
/// ascending or descending run, or the curated list.
pub fn is_denied(code: &RoomCode) -> bool {
    let d = code.digits();
    let all_same = d.iter().all(|&x| x == d[0]);
    let ascending = d.windows(2).all(|w| w[1] == w[0] + 1);
    let descending = d.windows(2).all(|w| w[0] == w[1] + 1);
    all_same || ascending || descending || CURATED_DENY_LIST.contains(&code.as_str())
}

// ---------------------------------------------------------------------------
// RoomCodeRegistry
// ---------------------------------------------------------------------------

/// Process-wide room code bookkeeping.
#[derive(Clone)]
pub struct RoomCodeRegistry {
    config: CodeRegistryConfig,
    clock: SharedClock,
    inner: Arc<Mutex<Inner>>,
}

impl RoomCodeRegistry {
    pub fn new(config: CodeRegistryConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn config(&self) -> &CodeRegistryConfig {
        &self.config
    }

    /// Lock and sweep. Every public operation goes through here.
    fn lock(&self) -> (MutexGuard<'_, Inner>, u64) {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.sweep(now);
        (inner, now)
    }

    fn ms(d: Duration) -> u64 {
        d.as_millis() as u64
    }

    /// Draw a fresh code and reserve it.
    ///
    /// # Errors
    /// [`RoomError::CodeGenerationExhausted`] when every draw hit a code
    /// that is denied, reserved, or active. That means the registry is
    /// near capacity, not a hiccup worth retrying silently.
    pub fn generate(&self) -> Result<RoomCode, RoomError> {
        let (mut inner, now) = self.lock();
        let mut rng = rand::rng();
        let attempts = self.config.max_generation_attempts;

        for _ in 0..attempts {
            let n: u16 = rng.random_range(RoomCode::MIN..=RoomCode::MAX);
            let code = RoomCode::from_number(n)?;
            if is_denied(&code) || inner.codes.contains_key(&code) {
                continue;
            }
            inner.codes.insert(
                code.clone(),
                RoomCodeRecord {
                    code: code.clone(),
                    state: CodeState::Reserved,
                    expires_at: now + Self::ms(self.config.reserved_ttl),
                },
            );
            debug!(%code, "room code reserved");
            return Ok(code);
        }

        warn!(
            attempts,
            in_use = inner.codes.len(),
            "room code space exhausted"
        );
        Err(RoomError::CodeGenerationExhausted { attempts })
    }

    /// Reserve a specific code.
    ///
    /// # Errors
    /// `InvalidRoomCode` for denied or already-held codes.
    pub fn reserve(&self, code: &RoomCode) -> Result<(), RoomError> {
        let (mut inner, now) = self.lock();
        if is_denied(code) || inner.codes.contains_key(code) {
            return Err(RoomError::InvalidRoomCode(code.to_string()));
        }
        inner.codes.insert(
            code.clone(),
            RoomCodeRecord {
                code: code.clone(),
                state: CodeState::Reserved,
                expires_at: now + Self::ms(self.config.reserved_ttl),
            },
        );
        Ok(())
    }

    /// Promote a reserved code to active (or refresh an active one).
    /// Returns `false` if the code is not held.
    pub fn activate(&self, code: &RoomCode) -> bool {
        let (mut inner, now) = self.lock();
        let Some(record) = inner.codes.get_mut(code) else {
            return false;
        };
        record.state = CodeState::Active;
        record.expires_at = now + Self::ms(self.config.active_ttl);
        info!(%code, "room code active");
        true
    }

    /// Give a code back. Returns `false` if it was not held.
    pub fn release(&self, code: &RoomCode) -> bool {
        let (mut inner, _) = self.lock();
        let released = inner.codes.remove(code).is_some();
        if released {
            debug!(%code, "room code released");
        }
        released
    }

    pub fn record(&self, code: &RoomCode) -> Option<RoomCodeRecord> {
        self.lock().0.codes.get(code).cloned()
    }

    pub fn is_in_use(&self, code: &RoomCode) -> bool {
        self.lock().0.codes.contains_key(code)
    }

    pub fn active_count(&self) -> usize {
        self.count(CodeState::Active)
    }

    pub fn reserved_count(&self) -> usize {
        self.count(CodeState::Reserved)
    }

    fn count(&self, state: CodeState) -> usize {
        self.lock()
            .0
            .codes
            .values()
            .filter(|r| r.state == state)
            .count()
    }

    // -- Brute-force guard ------------------------------------------------

    /// # Errors
    /// The remaining lockout time when `identity` is locked out.
    pub fn check_lockout(&self, identity: &str) -> Result<(), Duration> {
        let (mut inner, now) = self.lock();
        let Some(record) = inner.guesses.get_mut(identity) else {
            return Ok(());
        };
        match record.locked_until {
            Some(until) if until > now => Err(Duration::from_millis(until - now)),
            Some(_) => {
                record.locked_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Count a failed code guess. Returns the lockout duration if this
    /// failure triggered one.
    pub fn record_failed_attempt(&self, identity: &str) -> Option<Duration> {
        let (mut inner, now) = self.lock();
        let window = Self::ms(self.config.guess_tracking_window);
        let record = inner.guesses.entry(identity.to_owned()).or_default();
        while record
            .failures
            .front()
            .is_some_and(|&t| now.saturating_sub(t) >= window)
        {
            record.failures.pop_front();
        }
        record.failures.push_back(now);

        if record.failures.len() < self.config.max_failed_guesses as usize {
            debug!(identity, failures = record.failures.len(), "failed room code guess");
            return None;
        }
        record.failures.clear();
        record.locked_until = Some(now + Self::ms(self.config.lockout_duration));
        warn!(
            identity,
            lockout_secs = self.config.lockout_duration.as_secs(),
            "too many failed room code guesses, locking out"
        );
        Some(self.config.lockout_duration)
    }

    /// A successful join forgives earlier failed guesses.
    pub fn record_success(&self, identity: &str) {
        let (mut inner, _) = self.lock();
        if let Some(record) = inner.guesses.get_mut(identity) {
            record.failures.clear();
        }
    }

    pub fn failed_attempts(&self, identity: &str) -> usize {
        self.lock()
            .0
            .guesses
            .get(identity)
            .map_or(0, |g| g.failures.len())
    }

    // -- Persistence ------------------------------------------------------

    /// Persist every held code (with its TTL) under `key`.
    pub fn save_to(&self, store: &dyn KeyValueStore, key: &str) -> Result<(), RoomError> {
        let records: Vec<RoomCodeRecord> = self.lock().0.codes.values().cloned().collect();
        let blob = JsonCodec.encode(&records)?;
        store.save(key, blob)?;
        Ok(())
    }

    /// Load codes persisted by [`save_to`](Self::save_to). Expired
    /// records are dropped. Returns how many were restored.
    pub fn restore_from(&self, store: &dyn KeyValueStore, key: &str) -> Result<usize, RoomError> {
        let Some(blob) = store.load(key)? else {
            return Ok(0);
        };
        let records: Vec<RoomCodeRecord> = JsonCodec.decode(&blob)?;
        let (mut inner, now) = self.lock();
        let mut restored = 0;
        for record in records.into_iter().filter(|r| r.expires_at > now) {
            inner.codes.insert(record.code.clone(), record);
            restored += 1;
        }
        info!(restored, "room codes restored");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomlink_runtime::ManualClock;
    use roomlink_session::MemoryStore;
    use std::collections::HashSet;

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    fn registry() -> (RoomCodeRegistry, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (
            RoomCodeRegistry::new(CodeRegistryConfig::default(), clock.shared()),
            clock,
        )
    }

    #[test]
    fn test_is_denied_patterns() {
        for denied in ["1111", "9999", "1234", "6789", "9876", "3210", "1337", "2580"] {
            assert!(is_denied(&code(denied)), "{denied} should be denied");
        }
        for allowed in ["4821", "1235", "9875", "1001", "7070"] {
            assert!(!is_denied(&code(allowed)), "{allowed} should be allowed");
        }
    }

    #[test]
    fn test_generate_never_repeats_or_returns_denied() {
        let (reg, _) = registry();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let c = reg.generate().unwrap();
            assert!(!is_denied(&c));
            assert!(seen.insert(c), "duplicate code issued");
        }
        assert_eq!(reg.reserved_count(), 500);
    }

    #[test]
    fn test_generate_full_space_returns_exhausted() {
        let (reg, _) = registry();
        for n in RoomCode::MIN..=RoomCode::MAX {
            let c = RoomCode::from_number(n).unwrap();
            if !is_denied(&c) {
                reg.reserve(&c).unwrap();
            }
        }
        let err = reg.generate().unwrap_err();
        assert!(matches!(err, RoomError::CodeGenerationExhausted { attempts: 100 }));
    }

    #[test]
    fn test_reserve_rejects_denied_and_held() {
        let (reg, _) = registry();
        assert!(reg.reserve(&code("1234")).is_err());
        reg.reserve(&code("4821")).unwrap();
        assert!(reg.reserve(&code("4821")).is_err());
    }

    #[test]
    fn test_reserved_code_expires_after_five_minutes() {
        let (reg, clock) = registry();
        let c = reg.generate().unwrap();
        clock.advance(Duration::from_secs(299));
        assert!(reg.is_in_use(&c));
        clock.advance(Duration::from_secs(2));
        assert!(!reg.is_in_use(&c));
    }

    #[test]
    fn test_activate_extends_ttl_to_thirty_minutes() {
        let (reg, clock) = registry();
        let c = reg.generate().unwrap();
        assert!(reg.activate(&c));
        assert_eq!(reg.record(&c).unwrap().state, CodeState::Active);

        clock.advance(Duration::from_secs(29 * 60));
        assert!(reg.is_in_use(&c));
        clock.advance(Duration::from_secs(2 * 60));
        assert!(!reg.is_in_use(&c));
    }

    #[test]
    fn test_activate_unknown_code_returns_false() {
        let (reg, _) = registry();
        assert!(!reg.activate(&code("4821")));
    }

    #[test]
    fn test_release_is_idempotent() {
        let (reg, _) = registry();
        let c = reg.generate().unwrap();
        assert!(reg.release(&c));
        assert!(!reg.release(&c));
    }

    #[test]
    fn test_five_failed_guesses_lock_out_identity() {
        let (reg, clock) = registry();
        for _ in 0..4 {
            assert_eq!(reg.record_failed_attempt("P-1"), None);
        }
        assert_eq!(
            reg.record_failed_attempt("P-1"),
            Some(Duration::from_secs(300))
        );
        assert_eq!(reg.check_lockout("P-1"), Err(Duration::from_secs(300)));
        assert!(reg.check_lockout("P-2").is_ok());

        clock.advance(Duration::from_secs(301));
        assert!(reg.check_lockout("P-1").is_ok());
    }

    #[test]
    fn test_failed_guesses_outside_window_do_not_count() {
        let (reg, clock) = registry();
        for _ in 0..4 {
            reg.record_failed_attempt("P-1");
        }
        clock.advance(Duration::from_secs(11 * 60));
        assert_eq!(reg.record_failed_attempt("P-1"), None);
        assert_eq!(reg.failed_attempts("P-1"), 1);
    }

    #[test]
    fn test_record_success_clears_failures() {
        let (reg, _) = registry();
        for _ in 0..4 {
            reg.record_failed_attempt("P-1");
        }
        reg.record_success("P-1");
        assert_eq!(reg.failed_attempts("P-1"), 0);
        assert_eq!(reg.record_failed_attempt("P-1"), None);
    }

    #[test]
    fn test_save_and_restore_drops_expired_codes() {
        let (reg, clock) = registry();
        let reserved = reg.generate().unwrap();
        let active = reg.generate().unwrap();
        reg.activate(&active);

        let store = MemoryStore::new();
        reg.save_to(&store, "codes").unwrap();

        // A fresh registry after a restart ten minutes later.
        clock.advance(Duration::from_secs(10 * 60));
        let restarted = RoomCodeRegistry::new(CodeRegistryConfig::default(), clock.shared());
        assert_eq!(restarted.restore_from(&store, "codes").unwrap(), 1);
        assert!(restarted.is_in_use(&active));
        assert!(!restarted.is_in_use(&reserved));
    }

    #[test]
    fn test_restore_from_missing_key_restores_nothing() {
        let (reg, _) = registry();
        assert_eq!(reg.restore_from(&MemoryStore::new(), "codes").unwrap(), 0);
    }
}
