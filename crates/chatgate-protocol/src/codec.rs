//! Codec trait and implementations for serializing protocol types.
//!
//! The presence store persists [`SessionData`](crate::SessionData) through a
//! [`Codec`], and the chat router decodes
//! [`ChatMessage`](crate::ChatMessage)s with one. Neither cares which format
//! is underneath; [`JsonCodec`] is the only one today.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes Rust types to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because codecs live inside long-lived shared
/// state (the presence store, the server) that Tokio may touch from any
/// worker thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps presence records readable with `redis-cli GET session:<user>`,
/// which is worth more here than the bytes a binary format would save.
///
/// ## Example
///
/// ```rust
/// use chatgate_protocol::{Codec, ConnectionId, JsonCodec, SessionData};
///
/// let codec = JsonCodec;
/// let record = SessionData::new(ConnectionId::generate(), "10.0.0.5:8080", chrono::Utc::now());
///
/// let bytes = codec.encode(&record).unwrap();
/// let decoded: SessionData = codec.decode(&bytes).unwrap();
/// assert_eq!(record, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
