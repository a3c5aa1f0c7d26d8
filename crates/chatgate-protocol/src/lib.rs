//! Shared vocabulary for chatgate.
//!
//! - **Types** ([`UserId`], [`ConnectionId`], [`SessionData`], [`Payload`],
//!   [`ChatMessage`]): what the registry, the presence store and the chat
//!   collaborator pass between each other.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (frames) → Protocol (payloads, ids, records) → Session / Presence
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ChatMessage, ConnectionId, MessageStatus, Payload, SessionData, UserId,
};
