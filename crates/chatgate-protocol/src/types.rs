//! Core types shared by every chatgate layer.
//!
//! Identity newtypes, the presence record that is mirrored into shared
//! storage, the opaque payloads that travel through the pumps, and the chat
//! message model the demo router speaks.

use std::fmt;

use chatgate_transport::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The identifier of an authenticated user.
///
/// Produced by the authenticator from the token's `user_id` claim. The
/// gateway treats it as an opaque string: it keys the local registry and
/// the presence store, and nothing more.
///
/// `#[serde(transparent)]` keeps the JSON form a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Server-generated identifier of one connection instance.
///
/// A fresh random UUID is minted every time a user is admitted, so two
/// connections of the same user never share an id, even across
/// gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mints a new random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionData: the presence record
// ---------------------------------------------------------------------------

/// The externally visible claim that a user is online at a gateway.
///
/// Stored as JSON under a key derived from the user id. Exactly one record
/// exists per user; a newer admission anywhere overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// The connection currently holding the user.
    pub connection_id: String,
    /// Address of the gateway instance holding the connection, as other
    /// services should use it to reach that gateway.
    pub gateway_address: String,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
}

impl SessionData {
    /// Builds a record for a connection established at `connected_at`.
    pub fn new(
        connection_id: ConnectionId,
        gateway_address: &str,
        connected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            gateway_address: gateway_address.to_owned(),
            connected_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload: opaque application data
// ---------------------------------------------------------------------------

/// An application payload moving through a connection.
///
/// The gateway never looks inside; it only preserves whether the client
/// sent text or binary so the reply can be written back the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Extracts the payload from an application frame. Control frames
    /// carry no payload and yield `None`.
    pub fn from_frame(frame: Frame) -> Option<Self> {
        match frame {
            Frame::Text(text) => Some(Self::Text(text)),
            Frame::Binary(data) => Some(Self::Binary(data)),
            Frame::Ping(_) | Frame::Pong(_) | Frame::Close => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<Payload> for Frame {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Frame::Text(text),
            Payload::Binary(data) => Frame::Binary(data),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

// ---------------------------------------------------------------------------
// ChatMessage: what chat clients put inside payloads
// ---------------------------------------------------------------------------

/// Delivery state of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

/// A direct message between two users.
///
/// The gateway core does not depend on this type; it is the model the chat
/// service collaborator decodes from inbound payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: MessageStatus,
}

fn default_status() -> MessageStatus {
    MessageStatus::Sent
}
