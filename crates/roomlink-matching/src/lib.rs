//! Matching lifecycle for Roomlink.
//!
//! Tracks the local client from "looking for players" to "game starting"
//! with a strict transition table and a timeout budget per transient
//! state. See [`MatchingStateMachine`].

mod config;
mod error;
mod machine;
mod state;

pub use config::MatchingConfig;
pub use error::MatchingError;
pub use machine::{MatchingEvent, MatchingStateMachine};
pub use state::{GameMode, MatchState, MatchType, MatchingSessionState};
