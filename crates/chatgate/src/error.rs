//! Unified error type for the chatgate gateway.

use chatgate_presence::PresenceError;
use chatgate_protocol::ProtocolError;
use chatgate_session::{AuthError, RegistryError};
use chatgate_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// Binaries built on the `chatgate` meta-crate deal with this one type;
/// `?` converts the sub-crate errors through the `#[from]` impls.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Listener, upgrade or socket I/O failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A payload could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A credential was refused or could not be issued.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Admission or delivery failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The presence store could not be reached or answered badly.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// A flag or environment variable is missing or has a bad value.
    #[error(transparent)]
    Config(#[from] clap::Error),
}
