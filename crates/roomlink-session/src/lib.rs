//! Connection-level session for Roomlink.
//!
//! This crate handles everything about the local client's session that
//! is not specific to a room:
//!
//! 1. **Identity**: who the local player is ([`IdentityProvider`]).
//! 2. **Persistence**: an opaque key-value store ([`KeyValueStore`]) for
//!    state that must survive a restart.
//! 3. **Reconnection**: getting the transport back after it drops
//!    ([`ReconnectionCoordinator`]), with exponential backoff and a
//!    small recovery snapshot.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room / Matching (above)  ← react to reconnect events, persist state
//!     ↕
//! Session Layer (this crate)  ← identity, storage, reconnection
//!     ↕
//! Transport (below)  ← connect / disconnect / send
//! ```

mod error;
mod identity;
mod reconnect;
mod session;
mod store;

pub use error::SessionError;
pub use identity::{IdentityProvider, LocalIdentity, StaticIdentity};
pub use reconnect::{ReconnectEvent, ReconnectionCoordinator};
pub use session::{ConnectionState, ReconnectConfig, RecoveryState};
pub use store::{KeyValueStore, MemoryStore};
