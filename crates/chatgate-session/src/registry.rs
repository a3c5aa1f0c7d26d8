//! The connection registry: which user is connected to this gateway, and
//! through which connection.
//!
//! The registry is the only place that decides whether a connection is
//! "the" connection for a user. It keeps three promises:
//!
//! 1. **One connection per user.** Admitting a user who is already
//!    connected installs the new connection and evicts the old one in the
//!    same critical section. Two concurrent admissions for one user leave
//!    exactly one winner registered.
//! 2. **Sends never block.** [`send`](ConnectionRegistry::send) either puts
//!    the payload on the user's bounded queue or fails right away.
//! 3. **Stale removals are harmless.** A pump that outlives its
//!    connection's registration can call [`remove`](ConnectionRegistry::remove)
//!    as late as it likes: only the exact registered connection is ever
//!    taken out, and only that removal touches the presence record.
//!
//! # Locking
//!
//! The map sits behind a `std::sync::RwLock`. No lock is ever held across
//! an `.await`; presence I/O always happens after the guard is dropped.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chatgate_presence::PresenceStore;
use chatgate_protocol::{Payload, UserId};
use chatgate_transport::Transport;

use crate::pump;
use crate::{Connection, InboundHandler, RegistryConfig, RegistryError};

/// Tracks every live connection on this gateway, keyed by user.
///
/// Generic over the presence store and the inbound handler so tests can
/// run the whole thing against in-memory implementations. Shared as
/// `Arc<ConnectionRegistry<..>>`: the server, each connection's pumps and
/// whatever routes outbound messages all hold a clone.
pub struct ConnectionRegistry<P: PresenceStore, H: InboundHandler> {
    connections: RwLock<HashMap<UserId, Arc<Connection>>>,
    presence: P,
    inbound: H,
    config: RegistryConfig,
}

impl<P: PresenceStore, H: InboundHandler> ConnectionRegistry<P, H> {
    pub fn new(presence: P, inbound: H, config: RegistryConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            presence,
            inbound,
            config,
        }
    }

    /// Registers an authenticated transport as `user_id`'s connection.
    ///
    /// Steps, in order:
    /// 1. Install the new connection, evicting any previous one for the
    ///    same user. The evicted connection's queued payloads are dropped
    ///    and its write pump sends a close frame right away.
    /// 2. Write the presence record.
    /// 3. Start the read and write pumps.
    ///
    /// The pumps only start once the presence write has finished, so a
    /// client that hangs up immediately cannot have its record deleted
    /// before the write lands.
    ///
    /// # Errors
    /// [`RegistryError::Presence`] if step 2 fails. The pumps are started
    /// anyway, so the connection is still registered and still running;
    /// presence catches up on the next admission, and the TTL bounds how
    /// long a stale record can linger.
    pub async fn admit<T: Transport>(
        self: &Arc<Self>,
        user_id: UserId,
        transport: T,
    ) -> Result<Arc<Connection>, RegistryError> {
        let (connection, outbound) =
            Connection::new(user_id.clone(), self.config.queue_capacity);

        let evicted = {
            let mut connections = self.write();
            let previous = connections.insert(user_id.clone(), Arc::clone(&connection));
            if let Some(previous) = &previous {
                previous.evict();
            }
            previous
        };

        if let Some(previous) = evicted {
            tracing::info!(
                %user_id,
                evicted = %previous.id(),
                replaced_by = %connection.id(),
                "previous connection evicted"
            );
        }

        let recorded = self
            .presence
            .set_session(&user_id, connection.id(), connection.connected_at())
            .await;

        pump::spawn(Arc::clone(self), Arc::clone(&connection), transport, outbound);

        match recorded {
            Ok(_) => {
                tracing::info!(%user_id, connection_id = %connection.id(), "connection admitted");
                Ok(connection)
            }
            Err(err) => {
                tracing::warn!(
                    %user_id,
                    connection_id = %connection.id(),
                    error = %err,
                    "connection admitted but presence write failed"
                );
                Err(RegistryError::Presence(err))
            }
        }
    }

    /// Returns the connection currently registered for `user_id`.
    pub fn lookup(&self, user_id: &UserId) -> Option<Arc<Connection>> {
        self.read().get(user_id).cloned()
    }

    /// Enqueues `payload` for delivery to `user_id` without waiting.
    ///
    /// # Errors
    /// - [`RegistryError::NotConnected`] if the user has no connection here.
    /// - [`RegistryError::BackpressureExceeded`] if their queue is full.
    pub fn send(
        &self,
        user_id: &UserId,
        payload: impl Into<Payload>,
    ) -> Result<(), RegistryError> {
        let connection = self
            .lookup(user_id)
            .ok_or_else(|| RegistryError::NotConnected(user_id.clone()))?;
        connection.try_enqueue(payload.into())
    }

    /// Unregisters `connection` if, and only if, it is still the one
    /// registered for its user.
    ///
    /// Always starts the connection's teardown. The presence record is
    /// deleted only when this call is the one that took the connection out
    /// of the map, so a stale removal can never wipe out the record of the
    /// connection that replaced it. Calling this more than once is fine.
    pub async fn remove(&self, connection: &Arc<Connection>) {
        connection.begin_close();

        let removed = {
            let mut connections = self.write();
            let user_id = connection.user_id();
            let is_current = connections
                .get(user_id)
                .is_some_and(|current| Arc::ptr_eq(current, connection));
            if is_current {
                connections.remove(user_id);
            }
            is_current
        };

        connection.close_outbound();

        if !removed {
            return;
        }

        let user_id = connection.user_id();
        tracing::info!(%user_id, connection_id = %connection.id(), "connection removed");

        if let Err(err) = self.presence.remove_session(user_id).await {
            tracing::warn!(%user_id, error = %err, "failed to remove presence record");
        }
    }

    /// Closes `user_id`'s connection from the server side.
    ///
    /// # Errors
    /// [`RegistryError::NotConnected`] if the user has no connection here.
    pub async fn disconnect(&self, user_id: &UserId) -> Result<(), RegistryError> {
        let connection = self
            .lookup(user_id)
            .ok_or_else(|| RegistryError::NotConnected(user_id.clone()))?;
        self.remove(&connection).await;
        Ok(())
    }

    /// Removes every registered connection. Used on shutdown.
    pub async fn close_all(&self) {
        let connections: Vec<_> = self.read().values().cloned().collect();
        tracing::info!(count = connections.len(), "closing all connections");
        for connection in connections {
            self.remove(&connection).await;
        }
    }

    /// Returns the number of registered connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Users with a registered connection, in no particular order.
    pub fn connected_users(&self) -> Vec<UserId> {
        self.read().keys().cloned().collect()
    }

    pub fn presence(&self) -> &P {
        &self.presence
    }

    pub fn inbound(&self) -> &H {
        &self.inbound
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, Arc<Connection>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }
}
