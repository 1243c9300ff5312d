//! Retry delay schedule.

use std::time::Duration;

/// Delay schedule for retries.
///
/// With `exponential` set, attempt `n` (1-based) waits
/// `min(max, initial * multiplier^(n-1))`. Otherwise every attempt waits
/// `initial`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub exponential: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            exponential: true,
        }
    }
}

impl Backoff {
    /// A constant delay between attempts.
    pub fn constant(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            multiplier: 1.0,
            exponential: false,
        }
    }

    /// Delay before attempt `attempt` (1-based; 0 is treated as 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.initial;
        }
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.max(1.0).powi(exp);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs).min(self.max)
    }
}
