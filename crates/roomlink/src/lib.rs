//! # Roomlink
//!
//! Client-side room and matching coordination for small multiplayer
//! games.
//!
//! Roomlink keeps a local player's view of a 2–4 player room in step
//! with an authoritative server: four-digit room codes, host authority
//! and succession, versioned snapshots with conflict detection, a
//! matching lifecycle with per-state timeouts, and reconnection with
//! backoff. The server and the network are collaborators behind the
//! [`Transport`](roomlink_transport::Transport) trait.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roomlink::prelude::*;
//!
//! # async fn run() -> Result<(), RoomlinkError> {
//! roomlink::init_tracing();
//!
//! let transport = Arc::new(MemoryTransport::new());
//! let identity = StaticIdentity(LocalIdentity::new(PlayerId(7), "ada"));
//! let client = RoomlinkClient::builder(transport).start(&identity).await?;
//!
//! let room = client.room().create_room(4).await?;
//! println!("share code {}", room.room_code);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod telemetry;

pub use client::{ClientBuilder, ClientConfig, ForegroundOutcome, RoomlinkClient};
pub use error::RoomlinkError;
pub use telemetry::{DEFAULT_FILTER, init_tracing, init_tracing_with};

/// Re-exports of everything an embedding app typically needs.
pub mod prelude {
    pub use crate::{ClientBuilder, ClientConfig, ForegroundOutcome, RoomlinkClient, RoomlinkError};
    pub use roomlink_matching::{
        GameMode, MatchState, MatchType, MatchingConfig, MatchingEvent, MatchingStateMachine,
    };
    pub use roomlink_protocol::{PlayerId, PlayerInfo, RoomCode, RoomSnapshot, RoomStatus};
    pub use roomlink_room::{
        EnergyLedger, EnergyPool, HostPermissions, LocalState, RoomCloseReason, RoomConfig,
        RoomError, RoomEvent, RoomSessionHandle, StartWarning, UnlimitedEnergy,
    };
    pub use roomlink_runtime::{ManualClock, SystemClock};
    pub use roomlink_session::{
        IdentityProvider, KeyValueStore, LocalIdentity, MemoryStore, ReconnectConfig,
        ReconnectEvent, StaticIdentity,
    };
    pub use roomlink_transport::{MemoryTransport, Transport};
}
