//! Wire protocol for Roomlink.
//!
//! This crate defines the data the room client and the room server
//! exchange:
//!
//! - **Types** ([`RoomSnapshot`], [`PlayerInfo`], [`RoomCode`], ...):
//!   the room model and its invariants.
//! - **Messages** ([`RoomRequest`], [`RoomResponse`], [`RoomPush`],
//!   [`Envelope`]): what travels on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   turned into bytes. The same codec persists local state blobs.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room / Matching (domain)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    Envelope, Payload, RejectReason, RoomPush, RoomRequest, RoomResponse,
    ServerCloseReason,
};
pub use types::{PlayerId, PlayerInfo, RoomCode, RoomSnapshot, RoomStatus};
