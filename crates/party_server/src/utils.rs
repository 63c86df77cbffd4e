//! Convenience constructors for a single-process deployment.

use crate::config::ServerConfig;
use crate::game::Catalog;
use crate::hub::Hub;
use crate::relay::LocalRelay;
use crate::server::GameServer;
use crate::session::{SessionCoordinator, SessionOptions};
use crate::store::InMemoryStore;
use std::sync::Arc;

/// Builds a coordinator backed by the in-memory store and the in-process relay.
pub fn create_coordinator(catalog: Catalog, options: SessionOptions) -> Arc<SessionCoordinator> {
    SessionCoordinator::new(
        Arc::new(Hub::new()),
        Arc::new(InMemoryStore::new()),
        Arc::new(LocalRelay::new()),
        Arc::new(catalog),
        options,
    )
}

/// Creates a server with default configuration and the builtin catalog.
pub fn create_server() -> GameServer {
    create_server_with_config(ServerConfig::default())
}

/// Creates a server with custom configuration and the builtin catalog.
pub fn create_server_with_config(config: ServerConfig) -> GameServer {
    let options = SessionOptions {
        round_timers: config.round_timers,
    };
    GameServer::new(config, create_coordinator(Catalog::builtin(), options))
}
