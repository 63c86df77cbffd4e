//! Per-connection reader and writer workers.
//!
//! Each socket is split in two. The writer drains the connection's outbound
//! queue and keeps the link alive with pings; the reader decodes inbound
//! frames and hands them to the session coordinator. Closing the connection
//! ends both: the writer sees its queue close, the reader sees the close
//! signal.

use super::client::{Connection, Outbound};
use crate::config::ServerConfig;
use crate::session::SessionCoordinator;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

/// Type alias for WebSocket stream
pub type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsReceiver = SplitStream<WsStream>;

/// Runs a registered connection until it closes.
///
/// On return the player has been removed from its room (unless a newer
/// connection took over) and the connection is unregistered.
///
/// # Arguments
///
/// * `ws_stream` - The upgraded socket
/// * `connection` - The connection, already registered with the hub
/// * `outbound` - The receiving end of the connection's queue
/// * `coordinator` - Handles decoded frames and the departure on close
/// * `config` - Timeouts and size limits
pub async fn run_connection(
    ws_stream: WsStream,
    connection: Arc<Connection>,
    outbound: Outbound,
    coordinator: Arc<SessionCoordinator>,
    config: &ServerConfig,
) {
    let (sink, receiver) = ws_stream.split();

    let writer = tokio::spawn(write_loop(
        sink,
        outbound,
        connection.clone(),
        config.write_timeout,
        config.ping_interval,
    ));

    read_loop(
        receiver,
        &connection,
        &coordinator,
        config.idle_timeout,
        config.max_message_bytes,
    )
    .await;

    coordinator.disconnect(&connection).await;
    if let Err(e) = writer.await {
        warn!("Writer for connection {} ended abnormally: {}", connection.id(), e);
    }
}

async fn read_loop(
    mut receiver: WsReceiver,
    connection: &Arc<Connection>,
    coordinator: &SessionCoordinator,
    idle_timeout: Duration,
    max_message_bytes: usize,
) {
    let mut closed = connection.closed_signal();

    loop {
        let next = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => break,
            next = timeout(idle_timeout, receiver.next()) => next,
        };

        match next {
            Err(_) => {
                info!("⏰ Player {} idle for {:?}, closing", connection.player_id(), idle_timeout);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("WebSocket error for player {}: {}", connection.player_id(), e);
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                if text.len() > max_message_bytes {
                    warn!(
                        "📏 Player {} sent {} bytes (limit {}), closing",
                        connection.player_id(),
                        text.len(),
                        max_message_bytes
                    );
                    break;
                }
                coordinator.handle_frame(connection, text.as_str()).await;
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                debug!("Player {} requested close", connection.player_id());
                break;
            }
            Ok(Some(Ok(Message::Binary(_)))) => {
                warn!("Received unsupported binary frame from {}", connection.player_id());
            }
            // Pings are answered by tungstenite; any frame counts as liveness.
            Ok(Some(Ok(_))) => {}
        }
    }
}

async fn write_loop(
    mut sink: WsSink,
    mut outbound: Outbound,
    connection: Arc<Connection>,
    write_timeout: Duration,
    ping_interval: Duration,
) {
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame.to_string().into()),
                None => {
                    let _ = timeout(write_timeout, sink.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Default::default()),
        };

        match timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write to player {} failed: {}", connection.player_id(), e);
                break;
            }
            Err(_) => {
                warn!("⏰ Write to player {} timed out after {:?}", connection.player_id(), write_timeout);
                break;
            }
        }
    }

    connection.close();
}
