//! Presence store configuration.

use std::time::Duration;

use chatgate_protocol::UserId;

/// How presence records are named, stamped, and expired.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Lifetime of a record after its last write or refresh.
    ///
    /// Default: 30 minutes. A gateway that dies without cleaning up leaves
    /// its records behind for at most this long after the last heartbeat.
    pub ttl: Duration,

    /// Prepended to the user id to form the storage key.
    pub key_prefix: String,

    /// Address of this gateway instance, written into every record so other
    /// services know where the user's connection lives.
    pub gateway_address: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            key_prefix: "session:".to_string(),
            gateway_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl PresenceConfig {
    /// Creates a default config that advertises the given gateway address.
    pub fn for_gateway(gateway_address: impl Into<String>) -> Self {
        Self {
            gateway_address: gateway_address.into(),
            ..Default::default()
        }
    }

    /// The storage key for a user's record. Deterministic, so every gateway
    /// derives the same key for the same user.
    pub fn key_for(&self, user_id: &UserId) -> String {
        format!("{}{}", self.key_prefix, user_id)
    }
}
