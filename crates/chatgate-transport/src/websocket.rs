//! WebSocket transport implementation using `tokio-tungstenite`.

use std::fmt;
use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tokio_tungstenite::tungstenite::Message;

use crate::{Frame, FrameReader, FrameWriter, Transport, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Listens for TCP connections that will be upgraded to WebSockets.
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// The WebSocket handshake is NOT performed here, so a slow client
    /// cannot stall the accept loop. Call [`PendingUpgrade::upgrade`] from a
    /// task of its own.
    pub async fn accept(&self) -> Result<PendingUpgrade, TransportError> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%peer_addr, "accepted TCP connection");
        Ok(PendingUpgrade { stream, peer_addr })
    }
}

/// A TCP connection waiting for its WebSocket upgrade.
pub struct PendingUpgrade {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl PendingUpgrade {
    /// The remote address of the client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Performs the upgrade handshake, authorizing the client first.
    ///
    /// `authorize` receives the bearer credential taken from the
    /// `Authorization: Bearer` header, or from the `token` query parameter
    /// when the header is absent. If it returns `Err`, the client gets an
    /// HTTP 401 and the upgrade never happens.
    pub async fn upgrade<A, E, F>(
        self,
        authorize: F,
    ) -> Result<(WebSocketTransport, A), TransportError>
    where
        F: FnOnce(Option<&str>) -> Result<A, E> + Unpin,
        E: fmt::Display,
    {
        let peer_addr = self.peer_addr;
        let mut outcome: Option<Result<A, String>> = None;

        let callback = |req: &Request, resp: Response| {
            let credential = bearer_credential(req);
            match authorize(credential) {
                Ok(identity) => {
                    outcome = Some(Ok(identity));
                    Ok(resp)
                }
                Err(e) => {
                    let reason = e.to_string();
                    outcome = Some(Err(reason.clone()));
                    Err(unauthorized(reason))
                }
            }
        };

        let handshake =
            tokio_tungstenite::accept_hdr_async(self.stream, callback).await;

        match (handshake, outcome) {
            (Ok(ws), Some(Ok(identity))) => {
                tracing::debug!(%peer_addr, "WebSocket upgrade complete");
                Ok((WebSocketTransport { ws, peer_addr }, identity))
            }
            (_, Some(Err(reason))) => {
                tracing::debug!(%peer_addr, %reason, "upgrade rejected");
                Err(TransportError::Rejected(reason))
            }
            (Err(e), _) => Err(TransportError::AcceptFailed(
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e),
            )),
            (Ok(_), None) => Err(TransportError::AcceptFailed(
                std::io::Error::other("handshake finished without authorization"),
            )),
        }
    }
}

/// Pulls the bearer credential out of an upgrade request.
fn bearer_credential(req: &Request) -> Option<&str> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    from_header.or_else(|| {
        req.uri()
            .query()?
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
    })
}

fn unauthorized(reason: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

/// An upgraded WebSocket connection.
pub struct WebSocketTransport {
    ws: WsStream,
    peer_addr: SocketAddr,
}

impl WebSocketTransport {
    /// The remote address of the client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Transport for WebSocketTransport {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.ws.split();
        (WebSocketReader { stream }, WebSocketWriter { sink })
    }
}

/// The receiving half of a [`WebSocketTransport`].
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    Frame::Text(text.as_str().to_owned())
                }
                Some(Ok(Message::Binary(data))) => Frame::Binary(data.to_vec()),
                Some(Ok(Message::Ping(data))) => Frame::Ping(data.to_vec()),
                Some(Ok(Message::Pong(data))) => Frame::Pong(data.to_vec()),
                Some(Ok(Message::Close(_))) => Frame::Close,
                Some(Ok(Message::Frame(_))) => continue, // raw frames only appear on write
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
                None => return Ok(None),
            };
            return Ok(Some(frame));
        }
    }
}

/// The sending half of a [`WebSocketTransport`].
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter for WebSocketWriter {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(data) => Message::binary(data),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close => Message::Close(None),
        };
        self.sink.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}
