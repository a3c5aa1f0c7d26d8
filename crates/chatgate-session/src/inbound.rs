//! Where client-originated payloads go.
//!
//! The gateway does not interpret what clients send; routing chat messages
//! is somebody else's job. The read pump hands every text or binary frame
//! to an [`InboundHandler`] and moves on.

use std::future::Future;

use chatgate_protocol::{Payload, UserId};
use tokio::sync::mpsc;

/// Receives payloads read from client sockets.
///
/// `deliver` is awaited by the read pump, so a slow handler slows down
/// that one connection's reads (and with them its pong handling). Hand the
/// work off if it can take a while.
pub trait InboundHandler: Send + Sync + 'static {
    fn deliver(
        &self,
        user_id: &UserId,
        payload: Payload,
    ) -> impl Future<Output = ()> + Send;
}

/// A payload read from a client, tagged with who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: UserId,
    pub payload: Payload,
}

/// Forwards every inbound payload into an unbounded channel.
///
/// Unbounded so a stalled consumer never stalls socket reads; the consumer
/// is expected to keep up or apply its own limits.
#[derive(Debug, Clone)]
pub struct ChannelInbound {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl ChannelInbound {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl InboundHandler for ChannelInbound {
    async fn deliver(&self, user_id: &UserId, payload: Payload) {
        let message = InboundMessage {
            from: user_id.clone(),
            payload,
        };
        if self.tx.send(message).is_err() {
            tracing::debug!(%user_id, "inbound consumer gone, payload dropped");
        }
    }
}

/// Drops every inbound payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardInbound;

impl InboundHandler for DiscardInbound {
    async fn deliver(&self, user_id: &UserId, payload: Payload) {
        tracing::trace!(%user_id, len = payload.len(), "inbound payload discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_inbound_tags_sender() {
        let (handler, mut rx) = ChannelInbound::new();

        handler.deliver(&UserId::from("u1"), Payload::from("hi")).await;

        let message = rx.recv().await.unwrap();
        assert_eq!(message.from, UserId::from("u1"));
        assert_eq!(message.payload, Payload::from("hi"));
    }

    #[tokio::test]
    async fn test_channel_inbound_without_consumer_does_not_panic() {
        let (handler, rx) = ChannelInbound::new();
        drop(rx);

        handler.deliver(&UserId::from("u1"), Payload::from("lost")).await;
    }
}
