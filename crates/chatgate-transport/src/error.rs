/// Errors that can occur in the transport layer.
///
/// Every variant is terminal for the connection that produced it: the
/// pumps never retry a failed read or write in place.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding, accepting, or upgrading a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The upgrade was refused because the client's credential was
    /// rejected. The client received an HTTP 401 and no socket was opened.
    #[error("upgrade rejected: {0}")]
    Rejected(String),
}
