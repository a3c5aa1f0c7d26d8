//! Process-level configuration, from command-line flags or the environment.
//!
//! | Flag                   | Variable                     | Default                  |
//! |------------------------|------------------------------|--------------------------|
//! | `--bind-addr`          | `CHATGATE_BIND_ADDR`         | `0.0.0.0:8080`           |
//! | `--gateway-address`    | `CHATGATE_GATEWAY_ADDRESS`   | the bind address         |
//! | `--jwt-secret`         | `CHATGATE_JWT_SECRET`        | required                 |
//! | `--redis-url`          | `CHATGATE_REDIS_URL`         | `redis://127.0.0.1:6379` |
//! | `--presence-ttl-secs`  | `CHATGATE_PRESENCE_TTL_SECS` | `1800`                   |
//!
//! The gateway address is what other services see in presence records, so
//! set it whenever the bind address is not routable (for example
//! `0.0.0.0`).

use std::time::Duration;

use chatgate_presence::PresenceConfig;
use chatgate_session::RegistryConfig;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;

/// Everything needed to start a gateway process.
#[derive(Parser, Debug, Clone)]
pub struct GatewayConfig {
    /// Address the listener binds to
    #[arg(long, env = "CHATGATE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Address written into presence records [default: the bind address]
    #[arg(long, env = "CHATGATE_GATEWAY_ADDRESS")]
    pub gateway_address: Option<String>,

    /// HS256 secret shared with whoever issues tokens
    #[arg(
        long,
        env = "CHATGATE_JWT_SECRET",
        hide_env_values = true,
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub jwt_secret: String,

    /// Redis server holding the presence records
    #[arg(long, env = "CHATGATE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Seconds a presence record lives without a refresh
    #[arg(
        long,
        env = "CHATGATE_PRESENCE_TTL_SECS",
        default_value = "1800",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub presence_ttl_secs: u64,

    /// Queue size and liveness timing for every connection.
    #[arg(skip)]
    pub registry: RegistryConfig,
}

impl GatewayConfig {
    /// A config with every default filled in and the given secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            gateway_address: None,
            jwt_secret: jwt_secret.into(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            presence_ttl_secs: PresenceConfig::default().ttl.as_secs(),
            registry: RegistryConfig::default(),
        }
    }

    /// Reads the `CHATGATE_*` variables, ignoring the process arguments.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from([env!("CARGO_PKG_NAME")])
    }

    /// The address other services should use to reach this gateway.
    pub fn gateway_address(&self) -> &str {
        self.gateway_address.as_deref().unwrap_or(&self.bind_addr)
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    /// The presence settings this gateway writes records with.
    pub fn presence_config(&self) -> PresenceConfig {
        PresenceConfig {
            ttl: self.presence_ttl(),
            gateway_address: self.gateway_address().to_string(),
            ..PresenceConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    use super::*;

    fn parse(args: &[&str]) -> Result<GatewayConfig, clap::Error> {
        GatewayConfig::try_parse_from(std::iter::once("chatgate").chain(args.iter().copied()))
    }

    #[test]
    fn test_command_definition_is_consistent() {
        GatewayConfig::command().debug_assert();
    }

    #[test]
    fn test_parse_only_secret_uses_defaults() {
        let config = parse(&["--jwt-secret", "s3cret"]).unwrap();

        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.gateway_address(), "0.0.0.0:8080");
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.presence_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(config.registry.queue_capacity, 256);
    }

    #[test]
    fn test_parse_empty_secret_is_rejected() {
        let err = parse(&["--jwt-secret", ""]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_parse_overrides_every_setting() {
        let config = parse(&[
            "--jwt-secret",
            "k",
            "--bind-addr",
            "127.0.0.1:9000",
            "--gateway-address",
            "gw-3.internal:9000",
            "--redis-url",
            "redis://cache:6379/2",
            "--presence-ttl-secs",
            "90",
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.gateway_address(), "gw-3.internal:9000");
        assert_eq!(config.redis_url, "redis://cache:6379/2");
        assert_eq!(config.presence_ttl(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_bind_addr_becomes_gateway_address() {
        let config = parse(&["--jwt-secret", "k", "--bind-addr", "10.0.0.7:8080"]).unwrap();

        assert_eq!(config.gateway_address(), "10.0.0.7:8080");
    }

    #[test]
    fn test_parse_bad_ttl_is_rejected() {
        for bad in ["soon", "-5", "0"] {
            let flag = format!("--presence-ttl-secs={bad}");
            let err = parse(&["--jwt-secret", "k", &flag]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation, "{bad} should be rejected");
        }
    }

    #[test]
    fn test_presence_config_carries_gateway_address_and_ttl() {
        let mut config = GatewayConfig::new("k");
        config.gateway_address = Some("gw-1:80".into());
        config.presence_ttl_secs = 42;

        let presence = config.presence_config();

        assert_eq!(presence.gateway_address, "gw-1:80");
        assert_eq!(presence.ttl, Duration::from_secs(42));
        assert_eq!(presence.key_prefix, "session:");
    }
}
