//! Fixed-period ticker for background checks.
//!
//! The room session runs two periodic checks: the expiry watchdog
//! (every 30 s) and the sync health check (every 5 s). Both are a
//! [`Ticker`] sitting inside the session actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = watchdog.wait_for_tick() => {
//!             manager.check_expiry();
//!             watchdog.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! A ticker with a zero period is disabled and [`Ticker::wait_for_tick`]
//! pends forever, as does a paused ticker. Pausing is how a session
//! tears down its watchdog when it leaves a room without rebuilding the
//! select loop.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the ticker wakes up late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Skip the missed tick(s) and schedule from now.
    #[default]
    Skip,
    /// Keep the original cadence; the next tick fires at its originally
    /// scheduled time.
    Drop,
}

/// Full configuration for a [`Ticker`].
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Time between ticks. `Duration::ZERO` disables the ticker.
    pub period: Duration,
    /// Overrun handling policy.
    pub policy: OverrunPolicy,
    /// Fraction of `period` (0.0–1.0) the work for one tick may take
    /// before [`Ticker::record_tick_end`] reports it.
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max) added to the *first* tick so checks started
    /// at the same instant do not line up.
    pub initial_jitter: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            period: Duration::ZERO,
            policy: OverrunPolicy::default(),
            budget_warn_threshold: 0.80,
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickerConfig {
    /// A config ticking every `period` with default settings.
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info and budget reports
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`Ticker::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired more than 10% of a period late.
    pub overrun: bool,
    /// How many ticks were skipped due to overrun (0 in normal operation).
    pub ticks_skipped: u64,
}

/// Reported by [`Ticker::record_tick_end`] when a tick's work used more
/// than the warning fraction of its period.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetReport {
    pub tick: u64,
    pub elapsed: Duration,
    pub budget: Duration,
    /// `elapsed / budget`. Above 1.0 means the work overran the period.
    pub utilization: f64,
}

/// Runtime metrics for a ticker.
#[derive(Debug, Clone, Default)]
pub struct TickerMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of tick work time (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fixed-period ticker. One per periodic check.
pub struct Ticker {
    config: TickerConfig,
    period: Option<Duration>,
    tick_count: u64,
    /// When the next tick should fire (Tokio instant for `sleep_until`).
    next_tick: Option<TokioInstant>,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    paused: bool,
    metrics: TickerMetrics,
}

impl Ticker {
    /// Create a new ticker from config.
    pub fn new(config: TickerConfig) -> Self {
        let config = config.validated();
        let period = (!config.period.is_zero()).then_some(config.period);

        let next_tick = period.map(|d| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max_us = config.initial_jitter.as_micros().min(u128::from(u64::MAX)) as u64;
                Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
            };
            TokioInstant::now() + d + jitter
        });

        match period {
            None => debug!("ticker created disabled"),
            Some(p) => debug!(
                period_ms = p.as_secs_f64() * 1000.0,
                policy = ?config.policy,
                "ticker created"
            ),
        }

        Self {
            config,
            period,
            tick_count: 0,
            next_tick,
            tick_start: None,
            paused: false,
            metrics: TickerMetrics::default(),
        }
    }

    /// Create a ticker firing every `period` with default settings.
    pub fn every(period: Duration) -> Self {
        Self::new(TickerConfig::every(period))
    }

    /// Wait until the next tick is due.
    ///
    /// Disabled or paused tickers pend forever; `tokio::select!` keeps
    /// serving its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.period) {
            (Some(next), Some(period)) if !self.paused => (next, period),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let mut ticks_skipped = 0u64;

        self.next_tick = Some(match self.config.policy {
            OverrunPolicy::Skip => {
                if overrun {
                    ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
                    if ticks_skipped > 0 {
                        warn!(
                            tick = self.tick_count,
                            skipped = ticks_skipped,
                            late_ms = late_by.as_secs_f64() * 1000.0,
                            "ticker overrun, skipping ahead"
                        );
                    }
                }
                now + period
            }
            OverrunPolicy::Drop => {
                if overrun {
                    warn!(
                        tick = self.tick_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "ticker overrun, keeping original schedule"
                    );
                }
                next + period
            }
        });

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Record that the work for the current tick has finished.
    ///
    /// Returns a [`BudgetReport`] when the work used at least
    /// `budget_warn_threshold` of the period.
    pub fn record_tick_end(&mut self) -> Option<BudgetReport> {
        let start = self.tick_start.take()?;
        let elapsed = start.elapsed();

        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_tick_time.as_secs_f64();
        self.metrics.avg_tick_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);

        let budget = self.period?;
        let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();
        if utilization < self.config.budget_warn_threshold {
            return None;
        }
        warn!(
            tick = self.tick_count,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            budget_ms = budget.as_secs_f64() * 1000.0,
            utilization_pct = format!("{:.1}", utilization * 100.0),
            "tick work approaching period"
        );
        Some(BudgetReport {
            tick: self.tick_count,
            elapsed,
            budget,
            utilization,
        })
    }

    /// Pause the ticker. Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "ticker paused");
        }
    }

    /// Resume after a pause. The next tick is a full period from now, so
    /// time spent paused never produces a burst of ticks.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(period) = self.period {
                self.next_tick = Some(TokioInstant::now() + period);
            }
            debug!(tick = self.tick_count, "ticker resumed");
        }
    }

    /// Pause or resume to match `active`.
    pub fn set_active(&mut self, active: bool) {
        if active {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether this ticker was created with a zero period.
    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickerMetrics {
        &self.metrics
    }

    /// The configured period, or `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}
