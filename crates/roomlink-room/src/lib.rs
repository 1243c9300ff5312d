//! Room coordination for Roomlink.
//!
//! The local client's side of a small multiplayer room: creating and
//! joining rooms by four-digit code, tracking who is host, reconciling
//! local state with server pushes, and keeping abuse in check.
//!
//! # Key types
//!
//! - [`RoomSessionManager`]: create/join/leave/start, reacts to pushes
//! - [`RoomSessionHandle`]: talk to the session actor from anywhere
//! - [`HostAuthority`]: host status, permissions, succession
//! - [`RoomSynchronizer`]: versioned snapshots and conflict detection
//! - [`RoomCodeRegistry`]: code generation, TTLs, brute-force guard
//! - [`RoomEvent`]: everything asynchronous the UI may care about

mod code;
mod config;
mod energy;
mod error;
mod events;
pub mod handle;
mod host;
mod manager;
mod rate_limit;
mod sync;

pub use code::{CodeRegistryConfig, CodeState, RoomCodeRecord, RoomCodeRegistry, is_denied};
pub use config::{LocalState, RoomConfig};
pub use energy::{EnergyLedger, EnergyPool, UnlimitedEnergy};
pub use error::RoomError;
pub use events::{RoomCloseReason, RoomEvent};
pub use handle::{RoomSessionHandle, SessionInfo, spawn_session};
pub use host::{
    GameStartCheck, HostAuthority, HostPermissions, StartBlocker, StartContext, StartWarning,
};
pub use manager::RoomSessionManager;
pub use rate_limit::SlidingWindowLimiter;
pub use sync::{ApplyOutcome, ConflictKind, HealthReport, PendingOperation, RoomSynchronizer};
