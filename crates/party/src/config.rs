//! Application configuration loaded from a TOML file.
//!
//! The file has four sections: `[server]` for the listener and connection
//! timings, `[logging]`, `[catalog]` for extra word categories, and any
//! number of `[[seed_games]]` created at startup.

use crate::cli::Args;
use anyhow::{Context, Result};
use party_server::{Catalog, Category, CreateGameRequest, ServerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    /// Games created when the server starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed_games: Vec<CreateGameRequest>,
}

/// Network and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    pub max_connections: usize,
    /// Whether to use SO_REUSEPORT for multi-threaded accept loops (Unix only)
    pub use_reuse_port: bool,
    /// Outbound frames buffered per connection before it is dropped
    pub outbound_queue_capacity: usize,
    /// Seconds of client silence before a connection is closed
    pub idle_timeout_secs: u64,
    /// Seconds a single frame write may take
    pub write_timeout_secs: u64,
    /// Seconds between keep-alive pings
    pub ping_interval_secs: u64,
    /// Largest inbound text frame, in bytes
    pub max_message_bytes: usize,
    /// End rounds automatically after their time budget
    pub round_timers: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind_address: defaults.bind_address.to_string(),
            max_connections: defaults.max_connections,
            use_reuse_port: defaults.use_reuse_port,
            outbound_queue_capacity: defaults.outbound_queue_capacity,
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
            write_timeout_secs: defaults.write_timeout.as_secs(),
            ping_interval_secs: defaults.ping_interval.as_secs(),
            max_message_bytes: defaults.max_message_bytes,
            round_timers: defaults.round_timers,
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Extra word categories served next to the builtin ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// `path` and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(listen) = &args.listen {
            self.server.bind_address = listen.clone();
        }
        if let Some(max) = args.max_connections {
            self.server.max_connections = max;
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Converts the `[server]` section into the library's [`ServerConfig`].
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let bind_address: SocketAddr = self
            .server
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind address: {}", self.server.bind_address))?;
        Ok(ServerConfig {
            bind_address,
            max_connections: self.server.max_connections,
            use_reuse_port: self.server.use_reuse_port,
            outbound_queue_capacity: self.server.outbound_queue_capacity,
            idle_timeout: Duration::from_secs(self.server.idle_timeout_secs),
            write_timeout: Duration::from_secs(self.server.write_timeout_secs),
            ping_interval: Duration::from_secs(self.server.ping_interval_secs),
            max_message_bytes: self.server.max_message_bytes,
            round_timers: self.server.round_timers,
        })
    }

    /// Builds the catalog: builtin categories plus the configured ones.
    pub fn build_catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::builtin();
        for category in &self.catalog.categories {
            catalog
                .add(category.clone())
                .with_context(|| format!("catalog category '{}'", category.key))?;
        }
        Ok(catalog)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.to_server_config()
            .map_err(|e| e.to_string())?
            .validate()
    }
}
