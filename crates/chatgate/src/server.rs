//! `GatewayServer` builder and accept loop.
//!
//! This is the entry point for running a gateway. It ties the layers
//! together: listener → auth gate (during the upgrade) → registry → pumps.

use std::future::Future;
use std::sync::Arc;

use chatgate_presence::PresenceStore;
use chatgate_session::{
    AuthError, Authenticator, ConnectionRegistry, InboundHandler, RegistryConfig,
};
use chatgate_transport::{PendingUpgrade, TransportError, WebSocketListener};

use crate::GatewayError;

/// Builder for configuring and starting a gateway.
///
/// # Example
///
/// ```rust,ignore
/// use chatgate::prelude::*;
///
/// let server = GatewayServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(JwtAuthenticator::new(secret), presence, inbound)
///     .await?;
/// server.run().await
/// ```
pub struct GatewayServerBuilder {
    bind_addr: String,
    registry_config: RegistryConfig,
}

impl GatewayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            registry_config: RegistryConfig::default(),
        }
    }

    /// Sets the address to bind the listener to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the queue size and liveness timing for admitted connections.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Binds the listener and creates the registry.
    pub async fn build<A, P, H>(
        self,
        auth: A,
        presence: P,
        inbound: H,
    ) -> Result<GatewayServer<A, P, H>, GatewayError>
    where
        A: Authenticator,
        P: PresenceStore,
        H: InboundHandler,
    {
        let listener = WebSocketListener::bind(&self.bind_addr).await?;
        let registry = Arc::new(ConnectionRegistry::new(
            presence,
            inbound,
            self.registry_config,
        ));

        Ok(GatewayServer {
            listener,
            registry,
            auth: Arc::new(auth),
        })
    }
}

impl Default for GatewayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound gateway, ready to accept clients.
///
/// Call [`run()`](Self::run) to start accepting connections. Grab
/// [`registry()`](Self::registry) first if something else needs to send to
/// connected users.
pub struct GatewayServer<A: Authenticator, P: PresenceStore, H: InboundHandler> {
    listener: WebSocketListener,
    registry: Arc<ConnectionRegistry<P, H>>,
    auth: Arc<A>,
}

impl<A, P, H> GatewayServer<A, P, H>
where
    A: Authenticator,
    P: PresenceStore,
    H: InboundHandler,
{
    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry every admitted connection lands in.
    pub fn registry(&self) -> &Arc<ConnectionRegistry<P, H>> {
        &self.registry
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), GatewayError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every
    /// registered connection.
    ///
    /// Each accepted socket is upgraded in a task of its own, so a client
    /// that stalls mid-handshake never holds up the next accept.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = ?self.local_addr().ok(), "chatgate gateway running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pending) => {
                        let auth = Arc::clone(&self.auth);
                        let registry = Arc::clone(&self.registry);
                        tokio::spawn(handle_upgrade(pending, auth, registry));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("chatgate gateway shutting down");
        self.registry.close_all().await;
        Ok(())
    }
}

/// Authenticates and upgrades one socket, then hands it to the registry.
async fn handle_upgrade<A, P, H>(
    pending: PendingUpgrade,
    auth: Arc<A>,
    registry: Arc<ConnectionRegistry<P, H>>,
) where
    A: Authenticator,
    P: PresenceStore,
    H: InboundHandler,
{
    let peer_addr = pending.peer_addr();

    let upgraded = pending
        .upgrade(|credential: Option<&str>| match credential {
            Some(token) => auth.authenticate(token),
            None => Err(AuthError::Malformed("missing bearer credential".into())),
        })
        .await;

    let (transport, user_id) = match upgraded {
        Ok(upgraded) => upgraded,
        Err(TransportError::Rejected(reason)) => {
            tracing::info!(%peer_addr, %reason, "connection refused");
            return;
        }
        Err(e) => {
            tracing::debug!(%peer_addr, error = %e, "upgrade failed");
            return;
        }
    };

    if let Err(e) = registry.admit(user_id.clone(), transport).await {
        tracing::warn!(%user_id, %peer_addr, error = %e, "admission incomplete");
    }
}
