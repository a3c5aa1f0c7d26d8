//! Presence records for chatgate.
//!
//! Every gateway instance mirrors "user X is connected here" into shared
//! storage so other services can find the gateway holding a user. The
//! mirror is deliberately loose:
//!
//! - records expire on their own after a TTL unless refreshed, so a crashed
//!   gateway's users fall offline without anyone cleaning up;
//! - writes are last-writer-wins, so the most recent admission anywhere owns
//!   the record;
//! - nothing here retries. Failures go back to the caller.
//!
//! Two stores implement [`PresenceStore`]: [`RedisPresenceStore`] for real
//! deployments and [`MemoryPresenceStore`] for tests. Which one a registry
//! uses is decided by its type parameter, at construction.

mod config;
mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use config::PresenceConfig;
pub use error::PresenceError;
pub use memory::MemoryPresenceStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisPresenceStore;

use std::future::Future;
use std::sync::Arc;

use chatgate_protocol::{ConnectionId, SessionData, UserId};
use chrono::{DateTime, Utc};

/// Records, queries, refreshes and removes a user's presence record.
pub trait PresenceStore: Send + Sync + 'static {
    /// Writes the record for `user_id`, overwriting any previous one, and
    /// (re)starts its TTL. `connected_at` is when the connection was
    /// established, not when the record is written. Returns the record as
    /// written.
    fn set_session(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
        connected_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<SessionData, PresenceError>> + Send;

    /// Reads the record for `user_id`.
    ///
    /// # Errors
    /// [`PresenceError::NotOnline`] if there is no live record.
    fn get_session(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<SessionData, PresenceError>> + Send;

    /// Deletes the record for `user_id`. Deleting a missing record is not
    /// an error.
    fn remove_session(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;

    /// Returns whether a live record exists for `user_id`.
    fn is_online(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<bool, PresenceError>> + Send;

    /// Re-arms the TTL of an existing record without touching its content.
    ///
    /// # Errors
    /// [`PresenceError::NotOnline`] if the record already expired; a
    /// refresh never resurrects a record.
    fn refresh_ttl(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;
}

/// Lets one store be shared by a registry and whoever else needs to query
/// it (the server, tests, a chat router).
impl<P: PresenceStore> PresenceStore for Arc<P> {
    fn set_session(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
        connected_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<SessionData, PresenceError>> + Send {
        (**self).set_session(user_id, connection_id, connected_at)
    }

    fn get_session(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<SessionData, PresenceError>> + Send {
        (**self).get_session(user_id)
    }

    fn remove_session(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send {
        (**self).remove_session(user_id)
    }

    fn is_online(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<bool, PresenceError>> + Send {
        (**self).is_online(user_id)
    }

    fn refresh_ttl(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send {
        (**self).refresh_ttl(user_id)
    }
}
