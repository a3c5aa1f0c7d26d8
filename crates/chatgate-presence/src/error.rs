//! Error types for the presence layer.

use chatgate_protocol::{ProtocolError, UserId};

/// Errors that can occur while talking to the presence store.
///
/// None of these are retried by the store itself. The caller decides
/// whether a failure matters; the registry, for instance, only logs a
/// failed delete during teardown.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The backing store could not be reached or refused the command.
    #[error("presence store unavailable: {0}")]
    StoreUnavailable(String),

    /// No live record exists for the user: never written, deleted, or
    /// expired. This is an answer, not a failure of the store.
    #[error("user {0} is not online")]
    NotOnline(UserId),

    /// A stored record could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),
}
