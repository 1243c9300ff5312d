//! Per-identity sliding-window rate limiter.
//!
//! Keeps the timestamps of recent accepted attempts per key. An attempt
//! is allowed while fewer than `limit` timestamps fall inside the last
//! `window`; a rejected attempt is not recorded, so hammering the button
//! does not push the window further out.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Sliding-window limiter keyed by identity.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    limit: u32,
    window_ms: u64,
    hits: HashMap<String, VecDeque<u64>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_ms: window.as_millis() as u64,
            hits: HashMap::new(),
        }
    }

    /// Record an attempt for `key` at `now_ms`.
    ///
    /// # Errors
    /// Returns how long until the oldest attempt leaves the window.
    pub fn try_acquire(&mut self, key: &str, now_ms: u64) -> Result<(), Duration> {
        let window_ms = self.window_ms;
        let hits = self.hits.entry(key.to_owned()).or_default();
        while hits
            .front()
            .is_some_and(|&t| now_ms.saturating_sub(t) >= window_ms)
        {
            hits.pop_front();
        }

        if hits.len() >= self.limit as usize {
            let oldest = hits.front().copied().unwrap_or(now_ms);
            let retry_after = (oldest + window_ms).saturating_sub(now_ms);
            return Err(Duration::from_millis(retry_after));
        }
        hits.push_back(now_ms);
        Ok(())
    }

    /// Attempts currently counted for `key`.
    pub fn attempts(&self, key: &str) -> usize {
        self.hits.get(key).map_or(0, VecDeque::len)
    }

    /// Forget `key`.
    pub fn reset(&mut self, key: &str) {
        self.hits.remove(key);
    }

    /// Drop keys whose attempts all fell out of the window.
    pub fn prune(&mut self, now_ms: u64) {
        let window_ms = self.window_ms;
        self.hits.retain(|_, hits| {
            hits.back()
                .is_some_and(|&t| now_ms.saturating_sub(t) < window_ms)
        });
    }
}
