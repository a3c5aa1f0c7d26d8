//! A single admitted client connection.
//!
//! A [`Connection`] is the shared handle to one live socket. The registry
//! holds one `Arc<Connection>` per user; the read and write pumps each hold
//! another. Nobody but the write pump ever touches the socket's writer; the
//! rest of the system talks to it through the bounded outbound queue.
//!
//! # Lifecycle
//!
//! ```text
//!   Active ──(begin_close)──→ Closing ──(mark_closed)──→ Closed
//! ```
//!
//! - **Active**: registered, pumps running, `send` enqueues.
//! - **Closing**: teardown started (evicted, disconnected, or a pump
//!   failed). The outbound queue no longer accepts payloads.
//! - **Closed**: the write pump has sent the close frame and released the
//!   socket. Queued payloads are flushed first unless the connection was
//!   replaced, in which case they are dropped.
//!
//! The state lives in a `tokio::sync::watch` channel so the read pump can
//! wait for it to leave `Active` at the same time as it waits for a frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatgate_protocol::{ConnectionId, Payload, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::RegistryError;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closing,
    Closed,
}

/// One user's live connection on this gateway.
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    connected_at: DateTime<Utc>,

    /// Producer side of the outbound queue. `None` once teardown has
    /// started; dropping the sender is what tells the write pump to send
    /// the close frame and stop.
    outbound: Mutex<Option<mpsc::Sender<Payload>>>,

    state: watch::Sender<ConnectionState>,

    /// Set when a newer connection for the same user took over.
    replaced: AtomicBool,

    /// When the peer last answered a ping.
    last_seen: Mutex<Instant>,
}

impl Connection {
    /// Creates an `Active` connection and the receiving end of its queue.
    pub(crate) fn new(
        user_id: UserId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (state, _) = watch::channel(ConnectionState::Active);
        let connection = Arc::new(Self {
            id: ConnectionId::generate(),
            user_id,
            connected_at: Utc::now(),
            outbound: Mutex::new(Some(tx)),
            state,
            replaced: AtomicBool::new(false),
            last_seen: Mutex::new(Instant::now()),
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Whether a newer connection for the same user evicted this one.
    pub fn is_replaced(&self) -> bool {
        self.replaced.load(Ordering::Acquire)
    }

    /// When the last pong arrived (or when the connection was admitted,
    /// if none has yet).
    pub fn last_seen(&self) -> Instant {
        *lock(&self.last_seen)
    }

    /// Waits until the write pump has released the socket.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Puts `payload` on the outbound queue without waiting.
    ///
    /// # Errors
    /// - [`RegistryError::BackpressureExceeded`] if the queue is full. The
    ///   payload is dropped and nothing is retried.
    /// - [`RegistryError::NotConnected`] if teardown already started.
    pub fn try_enqueue(&self, payload: Payload) -> Result<(), RegistryError> {
        let outbound = lock(&self.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(RegistryError::NotConnected(self.user_id.clone()));
        };
        tx.try_send(payload).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                RegistryError::BackpressureExceeded(self.user_id.clone())
            }
            mpsc::error::TrySendError::Closed(_) => {
                RegistryError::NotConnected(self.user_id.clone())
            }
        })
    }

    pub(crate) fn touch(&self) {
        *lock(&self.last_seen) = Instant::now();
    }

    /// Moves `Active → Closing`. Returns `true` only for the caller that
    /// made the transition, so teardown work runs once.
    pub(crate) fn begin_close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Active {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        })
    }

    /// Starts teardown on behalf of the connection that replaces this one.
    /// Whatever is still queued is dropped instead of flushed.
    pub(crate) fn evict(&self) {
        self.replaced.store(true, Ordering::Release);
        self.begin_close();
        self.close_outbound();
    }

    pub(crate) fn mark_closed(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        });
    }

    /// Drops the queue's sender. Payloads already queued are still
    /// flushed by the write pump before it sends the close frame, unless
    /// the connection was [evicted](Self::evict).
    pub(crate) fn close_outbound(&self) {
        lock(&self.outbound).take();
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
