//! Transport abstraction layer for chatgate.
//!
//! A transport is one long-lived duplex session with a client. The gateway
//! never reads and writes through the same handle: [`Transport::split`]
//! hands the read half to the read pump and the write half to the write
//! pump, so inbound processing and outbound delivery never block each other.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `memory`: in-process transport pair for tests

mod error;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingUpgrade, WebSocketListener, WebSocketReader, WebSocketTransport,
    WebSocketWriter,
};

use std::future::Future;

/// A single unit on the wire.
///
/// Application frames (`Text`, `Binary`) carry opaque payloads the gateway
/// never interprets. Control frames follow the usual duplex-framing
/// semantics: `Ping` is a liveness check, `Pong` acknowledges one, `Close`
/// starts a graceful shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    /// Returns `true` for `Ping`, `Pong` and `Close`.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping(_) | Self::Pong(_) | Self::Close)
    }
}

/// An established duplex session that can be split into independent halves.
pub trait Transport: Send + 'static {
    /// The receiving half.
    type Reader: FrameReader;
    /// The sending half.
    type Writer: FrameWriter;

    /// Splits the transport into a reader and a writer that can be driven
    /// from different tasks.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// The receiving half of a [`Transport`].
pub trait FrameReader: Send + 'static {
    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the stream ended cleanly.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;
}

/// The sending half of a [`Transport`].
pub trait FrameWriter: Send + 'static {
    /// Sends a frame to the remote peer.
    fn send(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Flushes and closes the underlying connection. The peer's reader
    /// observes the end of the stream.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
