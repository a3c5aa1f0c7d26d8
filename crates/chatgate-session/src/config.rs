//! Timing and queue limits for registered connections.

use std::time::Duration;

/// Configuration shared by every connection a registry admits.
///
/// The defaults are the production values. Tests shrink them (or stretch
/// them) to make liveness behavior observable under paused time.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each connection's outbound queue. A `send` that finds
    /// the queue full is refused immediately.
    ///
    /// Default: 256.
    pub queue_capacity: usize,

    /// How long the read side waits for any frame before declaring the
    /// peer dead. Only a pong pushes the deadline forward.
    ///
    /// Default: 60 seconds.
    pub pong_wait: Duration,

    /// How often the write side sends a ping. Must be shorter than
    /// `pong_wait` or healthy peers get torn down.
    ///
    /// Default: 30 seconds.
    pub ping_period: Duration,

    /// Upper bound on a single frame write, including pings and the final
    /// close frame.
    ///
    /// Default: 10 seconds.
    pub write_wait: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(30),
            write_wait: Duration::from_secs(10),
        }
    }
}
