//! Single-shot, cancellable, replaceable timers.
//!
//! A [`TimerSlot`] holds at most one pending callback. Arming it again
//! aborts the previous task before spawning the new one, so a timer that
//! belongs to a superseded state can never fire into the new one. Each
//! arm gets a fresh *generation* number that is passed to the callback;
//! owners compare it against their own current generation to reject a
//! callback that was already running when it got replaced.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// One slot for a single-shot timer.
#[derive(Debug)]
pub struct TimerSlot {
    label: &'static str,
    armed: Option<(JoinHandle<()>, u64)>,
    generation: u64,
}

impl TimerSlot {
    /// An empty slot. `label` shows up in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            armed: None,
            generation: 0,
        }
    }

    /// Run `callback(generation)` after `after`, replacing whatever was
    /// armed before.
    ///
    /// Returns the generation, or `None` when called outside a Tokio
    /// runtime (nothing is scheduled).
    pub fn arm<F>(&mut self, after: Duration, callback: F) -> Option<u64>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        let Ok(handle) = Handle::try_current() else {
            warn!(timer = self.label, "no tokio runtime, timer not armed");
            return None;
        };
        self.generation += 1;
        let generation = self.generation;
        let task = handle.spawn(async move {
            tokio::time::sleep(after).await;
            callback(generation);
        });
        trace!(timer = self.label, generation, after_ms = after.as_millis() as u64, "timer armed");
        self.armed = Some((task, generation));
        Some(generation)
    }

    /// Abort the pending callback. Returns `true` if one was still
    /// pending. Safe to call repeatedly or after the timer fired.
    pub fn cancel(&mut self) -> bool {
        let Some((task, generation)) = self.armed.take() else {
            return false;
        };
        let pending = !task.is_finished();
        task.abort();
        if pending {
            trace!(timer = self.label, generation, "timer cancelled");
        }
        pending
    }

    /// Whether a callback is scheduled and has not run yet.
    pub fn is_armed(&self) -> bool {
        self.armed
            .as_ref()
            .is_some_and(|(task, _)| !task.is_finished())
    }

    /// Generation of the most recent `arm`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forget the current arm without aborting it. Used by a callback
    /// that has just fired and wants the slot to read as empty.
    pub fn clear_if(&mut self, generation: u64) {
        if self.armed.as_ref().is_some_and(|(_, g)| *g == generation) {
            self.armed = None;
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some((task, _)) = self.armed.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_arm_fires_once_with_generation() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut slot = TimerSlot::new("test");
        let f = fired.clone();
        let generation = slot.arm(Duration::from_secs(5), move |g| {
            f.store(g, Ordering::SeqCst);
        });
        assert_eq!(generation, Some(1));
        assert!(slot.is_armed());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_replaces_previous_timer() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut slot = TimerSlot::new("test");
        let f1 = fired.clone();
        slot.arm(Duration::from_secs(5), move |_| {
            f1.fetch_add(100, Ordering::SeqCst);
        });
        let f2 = fired.clone();
        slot.arm(Duration::from_secs(10), move |_| {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(slot.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut slot = TimerSlot::new("test");
        let f = fired.clone();
        slot.arm(Duration::from_secs(1), move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert!(slot.cancel());
        assert!(!slot.cancel());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_arm_without_runtime_returns_none() {
        let mut slot = TimerSlot::new("test");
        assert_eq!(slot.arm(Duration::from_secs(1), |_| {}), None);
        assert!(!slot.is_armed());
    }
}
