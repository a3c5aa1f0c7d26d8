//! The two tasks that drive every admitted connection.
//!
//! ```text
//!                 ┌──────────── read pump ────────────┐
//!   socket ──→ recv ─→ Pong?  → touch, extend deadline, refresh presence TTL
//!                    ─→ Text/Binary → InboundHandler::deliver
//!                    ─→ Close / EOF / error / deadline → remove
//!
//!                 ┌──────────── write pump ───────────┐
//!   queue ──→ payload → send (bounded by write_wait)
//!   ticker ─→ Ping    → send (bounded by write_wait)
//!   queue closed      → send Close, close socket, remove, mark Closed
//!   replaced          → drop the rest of the queue, then as above
//! ```
//!
//! The read pump only ever reads; the write pump is the only writer. Either
//! pump ending tears the connection down, and the other follows: the read
//! pump watches the connection state, the write pump watches its queue.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chatgate_presence::PresenceStore;
use chatgate_protocol::{Payload, UserId};
use chatgate_transport::{Frame, FrameReader, FrameWriter, Transport, TransportError};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::{Connection, ConnectionRegistry, ConnectionState, InboundHandler};

/// Splits `transport` and spawns both pumps for `connection`.
pub(crate) fn spawn<P, H, T>(
    registry: Arc<ConnectionRegistry<P, H>>,
    connection: Arc<Connection>,
    transport: T,
    outbound: mpsc::Receiver<Payload>,
) where
    P: PresenceStore,
    H: InboundHandler,
    T: Transport,
{
    let (reader, writer) = transport.split();
    tokio::spawn(read_pump(Arc::clone(&registry), Arc::clone(&connection), reader));
    tokio::spawn(write_pump(registry, connection, writer, outbound));
}

async fn read_pump<P, H, R>(
    registry: Arc<ConnectionRegistry<P, H>>,
    connection: Arc<Connection>,
    mut reader: R,
) where
    P: PresenceStore,
    H: InboundHandler,
    R: FrameReader,
{
    let pong_wait = registry.config().pong_wait;
    let user_id = connection.user_id().clone();
    let mut state = connection.watch_state();
    let mut deadline = Instant::now() + pong_wait;

    let reason = loop {
        let next = tokio::select! {
            next = tokio::time::timeout_at(deadline, reader.recv()) => next,
            () = leaving_active(&mut state) => break "connection closing",
        };

        let frame = match next {
            Err(_) => break "liveness deadline expired",
            Ok(Err(err)) => {
                tracing::debug!(%user_id, error = %err, "read failed");
                break "read error";
            }
            Ok(Ok(None)) | Ok(Ok(Some(Frame::Close))) => break "closed by peer",
            Ok(Ok(Some(frame))) => frame,
        };

        match frame {
            Frame::Pong(_) => {
                connection.touch();
                deadline = Instant::now() + pong_wait;
                if let Err(err) = registry.presence().refresh_ttl(&user_id).await {
                    tracing::warn!(%user_id, error = %err, "presence refresh failed");
                }
            }
            Frame::Ping(_) => {}
            frame => {
                if let Some(payload) = Payload::from_frame(frame) {
                    registry.inbound().deliver(&user_id, payload).await;
                }
            }
        }
    };

    tracing::debug!(%user_id, connection_id = %connection.id(), reason, "read pump stopped");
    registry.remove(&connection).await;
}

async fn write_pump<P, H, W>(
    registry: Arc<ConnectionRegistry<P, H>>,
    connection: Arc<Connection>,
    mut writer: W,
    mut outbound: mpsc::Receiver<Payload>,
) where
    P: PresenceStore,
    H: InboundHandler,
    W: FrameWriter,
{
    let config = registry.config();
    let write_wait = config.write_wait;
    let ping_period = config.ping_period;
    let user_id = connection.user_id().clone();

    // First ping one full period after admission, not immediately.
    let mut ticker = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(_) if connection.is_replaced() => {
                    send_close(&mut writer, write_wait, &user_id).await;
                    break "replaced by a newer connection";
                }
                Some(payload) => {
                    if let Err(err) = write_frame(&mut writer, payload.into(), write_wait).await {
                        tracing::debug!(%user_id, error = %err, "write failed");
                        break "write error";
                    }
                }
                None => {
                    send_close(&mut writer, write_wait, &user_id).await;
                    break "outbound queue closed";
                }
            },
            _ = ticker.tick() => {
                if let Err(err) = write_frame(&mut writer, Frame::Ping(Vec::new()), write_wait).await {
                    tracing::debug!(%user_id, error = %err, "ping failed");
                    break "ping error";
                }
            }
        }
    };

    match tokio::time::timeout(write_wait, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(%user_id, error = %err, "socket close failed"),
        Err(_) => tracing::debug!(%user_id, "socket close timed out"),
    }

    registry.remove(&connection).await;
    connection.mark_closed();
    tracing::debug!(%user_id, connection_id = %connection.id(), reason, "write pump stopped");
}

/// Resolves once the connection is no longer `Active`.
async fn leaving_active(state: &mut watch::Receiver<ConnectionState>) {
    let _ = state.wait_for(|s| *s != ConnectionState::Active).await;
}

async fn send_close<W: FrameWriter>(writer: &mut W, wait: Duration, user_id: &UserId) {
    if let Err(err) = write_frame(writer, Frame::Close, wait).await {
        tracing::debug!(%user_id, error = %err, "close frame not delivered");
    }
}

/// Sends one frame, giving up after `wait`.
async fn write_frame<W: FrameWriter>(
    writer: &mut W,
    frame: Frame,
    wait: Duration,
) -> Result<(), TransportError> {
    match tokio::time::timeout(wait, writer.send(frame)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::SendFailed(io::Error::new(
            io::ErrorKind::TimedOut,
            "write deadline exceeded",
        ))),
    }
}
