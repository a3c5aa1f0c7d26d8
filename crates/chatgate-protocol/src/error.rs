//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding protocol types.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a record
    /// written by an incompatible gateway version.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The bytes decoded but violate a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
