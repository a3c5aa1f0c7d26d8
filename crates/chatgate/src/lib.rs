//! # chatgate
//!
//! The connection edge of a chat system.
//!
//! A gateway accepts WebSocket clients, checks their JWT before the
//! upgrade completes, keeps at most one live connection per user, and
//! records in a shared presence store which gateway each user is on.
//! Everything a client sends goes to an [`InboundHandler`](chatgate_session::InboundHandler);
//! everything addressed to a client goes through
//! [`ConnectionRegistry::send`](chatgate_session::ConnectionRegistry::send).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatgate::prelude::*;
//!
//! # async fn start() -> Result<(), GatewayError> {
//! chatgate::init_tracing();
//! let config = GatewayConfig::from_env()?;
//! let presence = RedisPresenceStore::connect(&config.redis_url, config.presence_config()).await?;
//! let (inbound, _messages) = ChannelInbound::new();
//!
//! let server = GatewayServerBuilder::new()
//!     .bind(&config.bind_addr)
//!     .registry_config(config.registry.clone())
//!     .build(JwtAuthenticator::new(config.jwt_secret.as_bytes()), presence, inbound)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::{GatewayServer, GatewayServerBuilder};

/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`
/// (default `info`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything needed to run a gateway, in one import.
pub mod prelude {
    pub use chatgate_presence::{
        MemoryPresenceStore, PresenceConfig, PresenceError, PresenceStore,
    };
    #[cfg(feature = "redis")]
    pub use chatgate_presence::RedisPresenceStore;
    pub use chatgate_protocol::{
        ChatMessage, Codec, ConnectionId, JsonCodec, MessageStatus, Payload, ProtocolError,
        SessionData, UserId,
    };
    pub use chatgate_session::{
        AuthError, Authenticator, ChannelInbound, Connection, ConnectionRegistry,
        ConnectionState, DiscardInbound, InboundHandler, InboundMessage, JwtAuthenticator,
        RegistryConfig, RegistryError,
    };
    pub use chatgate_transport::{Frame, TransportError};

    pub use crate::{GatewayConfig, GatewayError, GatewayServer, GatewayServerBuilder};
}
