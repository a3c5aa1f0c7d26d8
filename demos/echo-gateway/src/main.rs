//! A single-node chat gateway.
//!
//! `echo-gateway serve` runs the gateway with Redis presence and routes
//! direct messages between users connected to this process. Without a
//! subcommand it does the same, configured from `CHATGATE_*` variables only.
//! `echo-gateway token <user_id> [ttl_secs]` prints a token signed with
//! `CHATGATE_JWT_SECRET` so clients have something to connect with.
//!
//! Clients send JSON like `{"receiver_id":"bob","content":"hi"}` and get
//! the stamped message back with `status` set to `delivered` (the receiver
//! is connected here) or `sent` (they are not).

use std::sync::Arc;
use std::time::Duration;

use chatgate::prelude::*;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser, Debug)]
#[command(name = "echo-gateway", version, about = "A single-node chat gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway (the default)
    Serve(GatewayConfig),

    /// Print a token for USER_ID signed with the gateway secret
    Token {
        user_id: String,

        /// Seconds until the token expires
        #[arg(default_value_t = 3600)]
        ttl_secs: u64,

        /// HS256 secret the gateway verifies tokens with
        #[arg(long, env = "CHATGATE_JWT_SECRET", hide_env_values = true)]
        jwt_secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Some(Command::Serve(config)) => serve(config).await?,
        None => {
            let config = GatewayConfig::from_env().unwrap_or_else(|e| e.exit());
            serve(config).await?;
        }
        Some(Command::Token {
            user_id,
            ttl_secs,
            jwt_secret,
        }) => {
            let token = JwtAuthenticator::new(jwt_secret.as_bytes())
                .issue(&UserId::from(user_id.as_str()), Duration::from_secs(ttl_secs))?;
            println!("{token}");
        }
    }

    Ok(())
}

async fn serve(config: GatewayConfig) -> Result<(), GatewayError> {
    chatgate::init_tracing();

    let presence =
        RedisPresenceStore::connect(&config.redis_url, config.presence_config()).await?;
    let (inbound, messages) = ChannelInbound::new();

    let server = GatewayServerBuilder::new()
        .bind(&config.bind_addr)
        .registry_config(config.registry.clone())
        .build(
            JwtAuthenticator::new(config.jwt_secret.as_bytes()),
            presence,
            inbound,
        )
        .await?;

    tracing::info!(
        bind = %config.bind_addr,
        gateway = %config.gateway_address(),
        "echo-gateway v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    tokio::spawn(route_messages(Arc::clone(server.registry()), messages));

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

// ---------------------------------------------------------------------------
// Direct-message routing
// ---------------------------------------------------------------------------

async fn route_messages<P, H>(
    registry: Arc<ConnectionRegistry<P, H>>,
    mut messages: UnboundedReceiver<InboundMessage>,
) where
    P: PresenceStore,
    H: InboundHandler,
{
    let codec = JsonCodec;
    while let Some(InboundMessage { from, payload }) = messages.recv().await {
        if let Err(e) = route(&registry, &codec, &from, &payload) {
            tracing::warn!(%from, error = %e, "message not routed");
        }
    }
}

/// Delivers one chat message to its receiver and acknowledges it to the
/// sender.
fn route<P, H>(
    registry: &Arc<ConnectionRegistry<P, H>>,
    codec: &JsonCodec,
    from: &UserId,
    payload: &Payload,
) -> Result<MessageStatus, GatewayError>
where
    P: PresenceStore,
    H: InboundHandler,
{
    let mut message: ChatMessage = codec.decode(payload.as_bytes())?;

    // The sender is whoever the token says, whatever the payload claims.
    message.sender_id = from.to_string();
    if message.id.is_empty() {
        message.id = uuid::Uuid::new_v4().to_string();
    }
    message.status = MessageStatus::Sent;

    let receiver = UserId::new(message.receiver_id.clone());
    match registry.send(&receiver, encode_text(codec, &message)?) {
        Ok(()) => message.status = MessageStatus::Delivered,
        Err(RegistryError::NotConnected(_)) => {
            tracing::debug!(%from, %receiver, "receiver not connected here");
        }
        Err(e) => return Err(e.into()),
    }

    registry.send(from, encode_text(codec, &message)?)?;
    Ok(message.status)
}

fn encode_text(codec: &JsonCodec, message: &ChatMessage) -> Result<String, GatewayError> {
    let bytes = codec.encode(message)?;
    // JSON is always valid UTF-8.
    String::from_utf8(bytes)
        .map_err(|e| GatewayError::Protocol(ProtocolError::InvalidMessage(e.to_string())))
}
