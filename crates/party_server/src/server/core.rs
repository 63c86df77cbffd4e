//! Core game server implementation.
//!
//! `GameServer` owns the listening sockets and the accept loops. Each accepted
//! socket is upgraded, registered with the hub and handed to its connection
//! workers; everything past that point goes through the session coordinator.

use super::handshake;
use crate::config::ServerConfig;
use crate::connection::{run_connection, Connection};
use crate::error::ServerError;
use crate::session::SessionCoordinator;
use futures::stream::{FuturesUnordered, StreamExt};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// The party game server.
///
/// # Architecture
///
/// * **Hub**: live connections and room membership
/// * **Session Coordinator**: game rules, store and relay
/// * **Accept loops**: one, or one per CPU core with `use_reuse_port`
pub struct GameServer {
    /// Server configuration settings
    config: Arc<ServerConfig>,

    /// Handles every decoded client intent
    coordinator: Arc<SessionCoordinator>,

    /// Flips to `true` once shutdown is requested
    shutdown_sender: watch::Sender<bool>,
}

impl GameServer {
    /// Creates a new game server.
    ///
    /// # Arguments
    ///
    /// * `config` - Network and connection settings
    /// * `coordinator` - Session coordinator; its hub becomes the server's hub
    pub fn new(config: ServerConfig, coordinator: Arc<SessionCoordinator>) -> Self {
        let (shutdown_sender, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            coordinator,
            shutdown_sender,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Requests a graceful shutdown of the accept loops.
    ///
    /// May be called before the server is started; `serve` then returns at once.
    pub fn shutdown(&self) {
        self.shutdown_sender.send_replace(true);
    }

    /// Binds the configured address and serves until [`shutdown`](Self::shutdown).
    ///
    /// # Multi-threading
    ///
    /// If `use_reuse_port` is enabled, one SO_REUSEPORT listener and accept
    /// loop is created per CPU core.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.config.validate().map_err(ServerError::Config)?;
        info!("🚀 Starting party server on {}", self.config.bind_address);

        let core_count = num_cpus::get();
        let num_acceptors = if self.config.use_reuse_port { core_count } else { 1 };
        info!("🧠 Detected {} CPU cores, using {} acceptor(s)", core_count, num_acceptors);

        let mut listeners = Vec::with_capacity(num_acceptors);
        for i in 0..num_acceptors {
            listeners.push(bind_listener(self.config.bind_address, self.config.use_reuse_port)?);
            info!("✅ Listener {} bound on {}", i, self.config.bind_address);
        }

        self.serve(listeners).await
    }

    /// Runs accept loops on already-bound listeners until shutdown.
    ///
    /// A socket holds one of `max_connections` permits from accept until it
    /// closes, so sockets still in their handshake count against the limit.
    pub async fn serve(&self, listeners: Vec<TcpListener>) -> Result<(), ServerError> {
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let slots = Arc::new(Semaphore::new(self.config.max_connections));

        let mut accept_futures = listeners
            .into_iter()
            .map(|listener| {
                let coordinator = self.coordinator.clone();
                let config = self.config.clone();
                let slots = slots.clone();

                async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, addr)) => {
                                let Ok(permit) = slots.clone().try_acquire_owned() else {
                                    warn!(
                                        "🚫 Refusing {}: connection limit of {} reached",
                                        addr, config.max_connections
                                    );
                                    drop(stream);
                                    continue;
                                };

                                let coordinator = coordinator.clone();
                                let config = config.clone();
                                tokio::spawn(async move {
                                    handle_connection(stream, addr, coordinator, config).await;
                                    drop(permit);
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                                break;
                            }
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();

        tokio::select! {
            _ = accept_futures.next() => {}
            _ = shutdown_receiver.wait_for(|stopping| *stopping) => {
                info!("Shutdown signal received");
            }
        }

        info!("🧹 Performing server cleanup...");
        self.coordinator.shutdown().await;
        info!("Server stopped");
        Ok(())
    }
}

/// Creates a non-blocking listener with SO_REUSEADDR (and SO_REUSEPORT when asked).
pub fn bind_listener(address: SocketAddr, reuse_port: bool) -> Result<TcpListener, ServerError> {
    let domain = if address.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
    socket.set_reuse_address(true).ok();

    if reuse_port {
        #[cfg(unix)]
        {
            if let Err(e) = socket.set_reuse_port(true) {
                warn!("Failed to set SO_REUSEPORT: {}", e);
            }
        }
        #[cfg(not(unix))]
        {
            warn!("SO_REUSEPORT is not supported on this platform. Using SO_REUSEADDR only.");
        }
    }

    socket
        .bind(&address.into())
        .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;
    socket
        .listen(1024)
        .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::Network(format!("Set non-blocking failed: {e}")))?;

    let std_listener: StdTcpListener = socket.into();
    TcpListener::from_std(std_listener)
        .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))
}

/// Upgrades one socket and runs it to completion.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    coordinator: Arc<SessionCoordinator>,
    config: Arc<ServerConfig>,
) {
    let (ws_stream, player_id) = match handshake::accept(stream).await {
        Ok(accepted) => accepted,
        Err(e) => {
            debug!("Rejected connection from {}: {}", addr, e);
            return;
        }
    };

    let (connection, outbound) = Connection::new(player_id, config.outbound_queue_capacity);
    let resumed = coordinator.hub().register(connection.clone()).await;
    match resumed {
        Some(room_id) => info!(
            "👋 Player {} reconnected from {} into game {}",
            connection.player_id(),
            addr,
            room_id
        ),
        None => info!("👋 Player {} connected from {}", connection.player_id(), addr),
    }

    run_connection(ws_stream, connection.clone(), outbound, coordinator, &config).await;
    info!("👋 Player {} disconnected", connection.player_id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Catalog;
    use crate::session::SessionOptions;
    use crate::utils::create_coordinator;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn server(config: ServerConfig) -> GameServer {
        GameServer::new(config, create_coordinator(Catalog::builtin(), SessionOptions::default()))
    }

    #[tokio::test]
    async fn shutdown_before_serve_returns_immediately() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let server = server(ServerConfig::default());
        server.shutdown();
        tokio::time::timeout(Duration::from_secs(1), server.serve(vec![listener]))
            .await
            .expect("serve should observe the earlier shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn pending_handshakes_count_against_the_limit() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(server(ServerConfig::default().with_max_connections(1)));
        let running = tokio::spawn({
            let server = server.clone();
            async move { server.serve(vec![listener]).await }
        });

        // Never completes its upgrade, but still takes the only slot.
        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut refused = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), refused.read(&mut buf))
            .await
            .expect("refused socket is closed promptly");
        assert!(matches!(read, Ok(0) | Err(_)));

        server.shutdown();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let server = server(ServerConfig::default().with_max_connections(0));
        assert!(matches!(server.start().await, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn bind_listener_reports_port_conflicts() {
        let first = bind_listener("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let taken = first.local_addr().unwrap();
        assert!(matches!(bind_listener(taken, false), Err(ServerError::Network(_))));
    }
}
