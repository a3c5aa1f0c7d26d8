//! In-process transport pair.
//!
//! [`pair`] returns a server-side [`MemoryTransport`] and the client-side
//! [`MemoryPeer`] that drives it. Tests use it to exercise the pumps without
//! opening sockets: the peer injects frames and errors, and observes every
//! frame the server writes, including the final `Close`.

use tokio::sync::mpsc;

use crate::{Frame, FrameReader, FrameWriter, Transport, TransportError};

/// Creates a connected transport/peer pair.
pub fn pair() -> (MemoryTransport, MemoryPeer) {
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let (to_peer, from_server) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            inbound: from_peer,
            outbound: to_peer,
        },
        MemoryPeer {
            to_server: Some(to_server),
            from_server,
        },
    )
}

/// Server side of an in-process connection.
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl Transport for MemoryTransport {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (
            MemoryReader {
                inbound: self.inbound,
            },
            MemoryWriter {
                outbound: Some(self.outbound),
            },
        )
    }
}

/// Receiving half of a [`MemoryTransport`].
pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        self.inbound.recv().await.transpose()
    }
}

/// Sending half of a [`MemoryTransport`].
pub struct MemoryWriter {
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or_else(|| {
            TransportError::ConnectionClosed("writer closed".into())
        })?;
        outbound.send(frame).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer dropped",
            ))
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }
}

/// Client side of an in-process connection.
pub struct MemoryPeer {
    to_server: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    from_server: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Delivers a frame to the server's reader.
    ///
    /// Returns `false` if the peer already hung up or the reader is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_server
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    /// Makes the server's next read fail with a receive error.
    pub fn fail(&self, reason: &str) -> bool {
        let err = TransportError::ReceiveFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            reason.to_owned(),
        ));
        self.to_server
            .as_ref()
            .is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    /// Ends the inbound stream; the server's reader sees a clean close.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }

    /// Waits for the next frame the server wrote.
    ///
    /// Returns `None` once the server closed its writer and every written
    /// frame has been consumed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.recv().await
    }

    /// Returns the next already-written frame without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_server.try_recv().ok()
    }
}
