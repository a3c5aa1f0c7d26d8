//! Error types for the session layer.

use chatgate_presence::PresenceError;
use chatgate_protocol::UserId;

/// Why a credential was refused.
///
/// Any of these ends the connection attempt: the upgrade is answered with
/// 401 and no connection is ever registered.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token could not be parsed, is missing a required claim, or is
    /// signed with an algorithm other than HS256.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token parsed but its signature does not match the secret.
    #[error("token signature is invalid")]
    SignatureInvalid,

    /// The token's `exp` claim is at or before the current time.
    #[error("token expired")]
    Expired,

    /// A token could not be signed (issuance only).
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Errors returned by [`ConnectionRegistry`](crate::ConnectionRegistry)
/// operations.
///
/// `NotConnected` and `BackpressureExceeded` are synchronous answers to a
/// `send`; the registry never retries and never blocks waiting for them to
/// clear.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The user has no live connection on this gateway.
    #[error("user {0} is not connected")]
    NotConnected(UserId),

    /// The user's outbound queue is full. The payload was not enqueued.
    #[error("outbound queue full for user {0}")]
    BackpressureExceeded(UserId),

    /// The connection was registered locally, but writing its presence
    /// record failed. The connection stays registered and keeps running.
    #[error("presence write failed: {0}")]
    Presence(#[from] PresenceError),
}
