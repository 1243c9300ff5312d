//! Timing and signalling primitives for Roomlink.
//!
//! Everything in the room and matching layers that depends on time or
//! fans out notifications goes through this crate:
//!
//! - [`Clock`]: wall-clock milliseconds for TTLs, expiry and rate limits.
//! - [`Ticker`]: periodic checks (expiry watchdog, sync health) with
//!   pause/resume and budget monitoring.
//! - [`TimerSlot`]: a single-shot timeout that is replaced, not stacked,
//!   when its owning state changes.
//! - [`Backoff`]: the retry delay schedule.
//! - [`EventBus`]: typed broadcast events with unsubscribe handles.
//!
//! All waiting uses Tokio time, so tests run with
//! `#[tokio::test(start_paused = true)]` and advance time instantly.

mod backoff;
mod clock;
mod events;
mod ticker;
mod timer;

pub use backoff::Backoff;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use events::{EventBus, Subscription};
pub use ticker::{BudgetReport, OverrunPolicy, TickInfo, Ticker, TickerConfig, TickerMetrics};
pub use timer::TimerSlot;
