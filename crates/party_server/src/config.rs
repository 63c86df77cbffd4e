//! Server configuration.
//!
//! Defines the runtime settings for the connection layer: where to listen,
//! how many sockets to accept, and the timing rules each connection obeys.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration settings for the party game server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Network address and port to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections; new sockets are refused beyond this
    pub max_connections: usize,

    /// Run one accept loop per CPU core on SO_REUSEPORT sockets
    pub use_reuse_port: bool,

    /// Capacity of each connection's outbound queue
    ///
    /// A connection whose queue is full when a message is enqueued is dropped.
    pub outbound_queue_capacity: usize,

    /// A connection that sends nothing (not even a pong) for this long is closed
    pub idle_timeout: Duration,

    /// A single frame write that takes longer than this closes the connection
    pub write_timeout: Duration,

    /// How often the writer pings the client; must be shorter than `idle_timeout`
    pub ping_interval: Duration,

    /// Largest inbound text frame accepted, in bytes
    pub max_message_bytes: usize,

    /// Whether rounds end on their own after `time_per_round`
    pub round_timers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            use_reuse_port: false,
            outbound_queue_capacity: 256,
            idle_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(54),
            max_message_bytes: 4096,
            round_timers: true,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `bind_address` with default timings.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Enable or disable automatic round expiry
    pub fn with_round_timers(mut self, enabled: bool) -> Self {
        self.round_timers = enabled;
        self
    }

    /// Checks the settings for consistency.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is usable, or a message describing the
    /// first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.max_connections > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(format!(
                "max_connections must be at most {}",
                tokio::sync::Semaphore::MAX_PERMITS
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err("outbound_queue_capacity must be greater than 0".to_string());
        }
        if self.max_message_bytes == 0 {
            return Err("max_message_bytes must be greater than 0".to_string());
        }
        if self.write_timeout.is_zero() {
            return Err("write_timeout must be greater than 0".to_string());
        }
        if self.ping_interval.is_zero() || self.ping_interval >= self.idle_timeout {
            return Err(format!(
                "ping_interval ({:?}) must be non-zero and shorter than idle_timeout ({:?})",
                self.ping_interval, self.idle_timeout
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.outbound_queue_capacity, 256);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ping_must_be_shorter_than_idle_timeout() {
        let mut config = ServerConfig::default();
        config.ping_interval = Duration::from_secs(60);
        assert!(config.validate().is_err());

        config.ping_interval = Duration::from_secs(30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_limit_bounds() {
        assert!(ServerConfig::default().with_max_connections(0).validate().is_err());
        assert!(ServerConfig::default().with_max_connections(usize::MAX).validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_max_connections(10)
            .with_round_timers(false);
        assert_eq!(config.max_connections, 10);
        assert!(!config.round_timers);
        assert_eq!(config.bind_address.port(), 9000);
    }
}
