//! Integration tests for the periodic ticker.
//!
//! Uses `tokio::time::pause()` (via `start_paused`) so `sleep_until`
//! resolves as soon as the runtime is idle.

use std::time::Duration;

use roomlink_runtime::{OverrunPolicy, Ticker, TickerConfig};

// =========================================================================
// Helpers
// =========================================================================

fn watchdog() -> TickerConfig {
    TickerConfig::every(Duration::from_secs(30))
}

fn disabled() -> TickerConfig {
    TickerConfig::every(Duration::ZERO)
}

// =========================================================================
// TickerConfig
// =========================================================================

#[test]
fn test_default_config_is_disabled() {
    let cfg = TickerConfig::default();
    assert_eq!(cfg.period, Duration::ZERO);
    assert_eq!(cfg.policy, OverrunPolicy::Skip);
    assert!(Ticker::new(cfg).is_disabled());
}

#[test]
fn test_validated_clamps_threshold() {
    let cfg = TickerConfig {
        budget_warn_threshold: 3.0,
        ..watchdog()
    }
    .validated();
    assert_eq!(cfg.budget_warn_threshold, 1.0);
}

// =========================================================================
// Creation and accessors
// =========================================================================

#[tokio::test]
async fn test_ticker_initial_state() {
    let t = Ticker::new(watchdog());
    assert_eq!(t.tick_count(), 0);
    assert!(!t.is_disabled());
    assert!(!t.is_paused());
    assert_eq!(t.period(), Some(Duration::from_secs(30)));
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_after_one_period() {
    let start = tokio::time::Instant::now();
    let mut t = Ticker::new(watchdog());

    let info = t.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert!(!info.overrun);
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_multiple_ticks_increment_monotonically() {
    let mut t = Ticker::every(Duration::from_secs(5));

    for expected in 1..=5 {
        let info = t.wait_for_tick().await;
        assert_eq!(info.tick, expected);
    }
    assert_eq!(t.tick_count(), 5);
    assert_eq!(t.metrics().total_ticks, 5);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_ticker_never_fires() {
    let mut t = Ticker::new(disabled());
    let result = tokio::time::timeout(Duration::from_secs(600), t.wait_for_tick()).await;
    assert!(result.is_err(), "disabled ticker should pend forever");
}

#[tokio::test(start_paused = true)]
async fn test_initial_jitter_delays_first_tick_only() {
    let start = tokio::time::Instant::now();
    let mut t = Ticker::new(TickerConfig {
        initial_jitter: Duration::from_secs(1),
        ..TickerConfig::every(Duration::from_secs(5))
    });

    t.wait_for_tick().await;
    let first = start.elapsed();
    assert!(first >= Duration::from_secs(5) && first < Duration::from_secs(6));

    t.wait_for_tick().await;
    assert_eq!(start.elapsed() - first, Duration::from_secs(5));
}

// =========================================================================
// Pause / Resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_prevents_ticks() {
    let mut t = Ticker::every(Duration::from_secs(5));
    t.wait_for_tick().await;

    t.pause();
    assert!(t.is_paused());

    let result = tokio::time::timeout(Duration::from_secs(60), t.wait_for_tick()).await;
    assert!(result.is_err(), "paused ticker should pend");
}

#[tokio::test(start_paused = true)]
async fn test_resume_schedules_a_full_period_from_now() {
    let mut t = Ticker::every(Duration::from_secs(5));
    t.pause();
    tokio::time::advance(Duration::from_secs(100)).await;

    let resumed_at = tokio::time::Instant::now();
    t.resume();
    let info = t.wait_for_tick().await;

    assert_eq!(info.tick, 1);
    assert!(!info.overrun, "time spent paused is not an overrun");
    assert_eq!(resumed_at.elapsed(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_pause_resume_idempotent() {
    let mut t = Ticker::new(watchdog());

    t.pause();
    t.pause();
    assert!(t.is_paused());

    t.set_active(true);
    t.resume();
    assert!(!t.is_paused());
}

// =========================================================================
// Overruns
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reports_skipped_ticks() {
    let mut t = Ticker::every(Duration::from_secs(5));

    // Block the "actor" well past several deadlines without polling.
    tokio::time::advance(Duration::from_secs(17)).await;

    let info = t.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 2);
    assert_eq!(t.metrics().total_overruns, 1);
    assert_eq!(t.metrics().total_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_original_schedule() {
    let start = tokio::time::Instant::now();
    let mut t = Ticker::new(TickerConfig {
        policy: OverrunPolicy::Drop,
        ..TickerConfig::every(Duration::from_secs(5))
    });

    tokio::time::advance(Duration::from_secs(7)).await;
    let info = t.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 0);

    // Next deadline is 10s after start, not 12s.
    t.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

// =========================================================================
// Budget
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_noop() {
    let mut t = Ticker::new(watchdog());
    assert!(t.record_tick_end().is_none());
    assert_eq!(t.metrics().max_tick_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_under_budget_returns_none() {
    let mut t = Ticker::new(watchdog());
    t.wait_for_tick().await;
    // record_tick_end measures wall-clock work, a few microseconds here.
    std::thread::sleep(Duration::from_micros(50));
    assert!(t.record_tick_end().is_none());
    assert!(t.metrics().max_tick_time > Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_over_budget_reports() {
    let mut t = Ticker::new(TickerConfig {
        budget_warn_threshold: 0.5,
        ..TickerConfig::every(Duration::from_millis(10))
    });
    t.wait_for_tick().await;
    std::thread::sleep(Duration::from_millis(20));

    let report = t.record_tick_end().expect("work exceeded half the period");
    assert_eq!(report.tick, 1);
    assert_eq!(report.budget, Duration::from_millis(10));
    assert!(report.utilization >= 1.0);
}

// =========================================================================
// Integration: select! loop pattern (mirrors the room session actor)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_pattern() {
    let mut health = Ticker::every(Duration::from_secs(5));
    let mut watchdog = Ticker::new(watchdog());
    watchdog.pause();

    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(10);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(16)).await;
        tx.send("stop").await.ok();
    });

    let mut health_ticks = 0u64;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            info = health.wait_for_tick() => {
                health_ticks += 1;
                health.record_tick_end();
                assert_eq!(info.tick, health_ticks);
            }
            _ = watchdog.wait_for_tick() => {
                panic!("paused watchdog must not fire");
            }
        }
    }

    assert_eq!(health_ticks, 3);
}
