//! Connection lifecycle for chatgate.
//!
//! This crate decides who gets in and keeps track of who is here:
//!
//! 1. **Authentication**: a bearer JWT becomes a [`UserId`](chatgate_protocol::UserId)
//!    ([`Authenticator`], [`JwtAuthenticator`]).
//! 2. **Registration**: at most one live [`Connection`] per user on this
//!    gateway ([`ConnectionRegistry`]), mirrored into a presence store.
//! 3. **Pumping**: every connection gets a read task and a write task that
//!    handle liveness (ping/pong), backpressure and teardown.
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway server (above)  ← accepts sockets, runs the auth gate, admits
//!     ↕
//! Session layer (this crate)  ← registry, connections, pumps
//!     ↕
//! Presence / Protocol / Transport (below)
//! ```

mod auth;
mod config;
mod connection;
mod error;
mod inbound;
mod pump;
mod registry;

pub use auth::{Authenticator, JwtAuthenticator};
pub use config::RegistryConfig;
pub use connection::{Connection, ConnectionState};
pub use error::{AuthError, RegistryError};
pub use inbound::{ChannelInbound, DiscardInbound, InboundHandler, InboundMessage};
pub use registry::ConnectionRegistry;
