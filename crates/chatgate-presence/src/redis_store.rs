//! Redis-backed presence store.
//!
//! One string key per user (`session:{user_id}` by default) holding the
//! JSON-encoded [`SessionData`], with a Redis-side expiry:
//!
//! | operation        | command                    |
//! |------------------|----------------------------|
//! | `set_session`    | `SET key value EX ttl`     |
//! | `get_session`    | `GET key`                  |
//! | `remove_session` | `DEL key`                  |
//! | `is_online`      | `EXISTS key`               |
//! | `refresh_ttl`    | `EXPIRE key ttl`           |

use chatgate_protocol::{Codec, ConnectionId, JsonCodec, SessionData, UserId};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::{PresenceConfig, PresenceError, PresenceStore};

/// A [`PresenceStore`] shared by every gateway instance through Redis.
///
/// Holds a [`ConnectionManager`], which reconnects on its own after a
/// dropped connection. Commands issued while Redis is unreachable fail with
/// [`PresenceError::StoreUnavailable`]; they are not queued or retried.
#[derive(Clone)]
pub struct RedisPresenceStore {
    conn: ConnectionManager,
    config: PresenceConfig,
    codec: JsonCodec,
}

impl RedisPresenceStore {
    /// Opens a managed connection to the Redis server at `url`.
    pub async fn connect(
        url: &str,
        config: PresenceConfig,
    ) -> Result<Self, PresenceError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        tracing::info!(
            gateway_address = %config.gateway_address,
            ttl_secs = config.ttl.as_secs(),
            "connected to Redis presence store"
        );
        Ok(Self {
            conn,
            config,
            codec: JsonCodec,
        })
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    fn ttl_secs(&self) -> u64 {
        // Redis rejects an expiry of 0.
        self.config.ttl.as_secs().max(1)
    }
}

fn unavailable(e: redis::RedisError) -> PresenceError {
    PresenceError::StoreUnavailable(e.to_string())
}

impl PresenceStore for RedisPresenceStore {
    async fn set_session(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
        connected_at: DateTime<Utc>,
    ) -> Result<SessionData, PresenceError> {
        let key = self.config.key_for(user_id);
        let data = SessionData::new(connection_id, &self.config.gateway_address, connected_at);
        let bytes = self.codec.encode(&data)?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, bytes, self.ttl_secs())
            .await
            .map_err(unavailable)?;

        tracing::debug!(%user_id, %key, "presence record written");
        Ok(data)
    }

    async fn get_session(
        &self,
        user_id: &UserId,
    ) -> Result<SessionData, PresenceError> {
        let key = self.config.key_for(user_id);
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn.get(&key).await.map_err(unavailable)?;

        match bytes {
            Some(bytes) => Ok(self.codec.decode(&bytes)?),
            None => Err(PresenceError::NotOnline(user_id.clone())),
        }
    }

    async fn remove_session(&self, user_id: &UserId) -> Result<(), PresenceError> {
        let key = self.config.key_for(user_id);
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&key).await.map_err(unavailable)?;
        tracing::debug!(%user_id, %key, "presence record deleted");
        Ok(())
    }

    async fn is_online(&self, user_id: &UserId) -> Result<bool, PresenceError> {
        let key = self.config.key_for(user_id);
        let mut conn = self.conn.clone();
        conn.exists(&key).await.map_err(unavailable)
    }

    async fn refresh_ttl(&self, user_id: &UserId) -> Result<(), PresenceError> {
        let key = self.config.key_for(user_id);
        let seconds = i64::try_from(self.ttl_secs()).unwrap_or(i64::MAX);
        let mut conn = self.conn.clone();
        let refreshed: bool =
            conn.expire(&key, seconds).await.map_err(unavailable)?;

        if refreshed {
            Ok(())
        } else {
            Err(PresenceError::NotOnline(user_id.clone()))
        }
    }
}
