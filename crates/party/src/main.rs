//! Party game server binary.
//!
//! Loads configuration, initialises logging, checks the store and relay,
//! seeds the configured games and serves WebSocket clients until SIGINT or
//! SIGTERM.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::Args;
use config::AppConfig;
use party_server::{
    GameServer, Hub, InMemoryStore, LocalRelay, SessionCoordinator, SessionOptions,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The assembled server and the configuration it was built from.
struct Application {
    config: AppConfig,
    server: Arc<GameServer>,
}

impl Application {
    /// Loads configuration, sets up logging and builds the server.
    async fn new(args: Args) -> Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config).await?;
        config.apply_args(&args);

        logging::setup_logging(&config.logging, args.debug, args.json_logs)?;

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

        let server_config = config.to_server_config()?;
        let catalog = config.build_catalog()?;
        info!("📚 Catalog loaded with {} categories", catalog.len());

        let coordinator = SessionCoordinator::new(
            Arc::new(Hub::new()),
            Arc::new(InMemoryStore::new()),
            Arc::new(LocalRelay::new()),
            Arc::new(catalog),
            SessionOptions {
                round_timers: server_config.round_timers,
            },
        );
        coordinator
            .health_check()
            .await
            .context("startup health check")?;

        info!("📂 Config: {}", args.config.display());
        Ok(Self {
            config,
            server: Arc::new(GameServer::new(server_config, coordinator)),
        })
    }

    /// Creates the `[[seed_games]]` so clients have something to join.
    async fn seed_games(&self) {
        let coordinator = self.server.coordinator();
        for request in &self.config.seed_games {
            match coordinator.create_game(request.clone()).await {
                Ok(record) => info!("🌱 Seeded game '{}' ({})", record.name, record.id),
                Err(e) => warn!("Skipping seed game '{}': {}", request.name, e),
            }
        }
    }

    /// Serves until a shutdown signal arrives.
    async fn run(self) -> Result<()> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  ⏱️ Idle timeout: {}s", self.config.server.idle_timeout_secs);
        info!("  ⏰ Round timers: {}", self.config.server.round_timers);

        self.seed_games().await;

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.start().await })
        };

        let outcome = tokio::select! {
            result = &mut server_handle => result,
            signal = signals::shutdown_signal() => {
                if let Err(e) = signal {
                    error!("Signal handler failed: {}", e);
                }
                info!("🛑 Shutdown signal received, stopping server...");
                self.server.shutdown();
                server_handle.await
            }
        };

        match outcome {
            Ok(Ok(())) => {
                info!("✅ Server stopped cleanly");
                Ok(())
            }
            Ok(Err(e)) => Err(anyhow!("server error: {e}")),
            Err(e) => Err(anyhow!("server task failed: {e}")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let app = Application::new(args).await?;
    app.run().await
}
