//! Real sockets: handshake, request/reply and size limits over loopback.

use futures::{SinkExt, StreamExt};
use party_server::server::bind_listener;
use party_server::{
    create_coordinator, Catalog, CreateGameRequest, GameServer, GameSettings, ServerConfig,
    SessionCoordinator, SessionOptions,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{http::StatusCode, Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (Arc<GameServer>, Arc<SessionCoordinator>, SocketAddr) {
    let coordinator = create_coordinator(Catalog::builtin(), SessionOptions { round_timers: false });
    let listener = bind_listener("127.0.0.1:0".parse().expect("valid address"), false)
        .expect("Failed to bind loopback listener");
    let addr = listener.local_addr().expect("bound address");

    let mut config = ServerConfig::new(addr);
    config.max_message_bytes = 1024;
    let server = Arc::new(GameServer::new(config, coordinator.clone()));

    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve(vec![listener]).await.expect("server loop");
    });
    (server, coordinator, addr)
}

async fn connect(addr: SocketAddr, player: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws?player_id={player}"))
        .await
        .expect("Failed to connect");
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("JSON frame");
        }
    }
}

async fn next_of(ws: &mut Client, kind: &str) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("Failed to send frame");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handshake_requires_player_id() {
    let (server, _, addr) = spawn_server().await;

    let err = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect_err("upgrade without player_id must fail");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
        other => panic!("unexpected handshake error: {other}"),
    }
    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_join_and_start_over_websocket() {
    let (server, coordinator, addr) = spawn_server().await;
    let game = coordinator
        .create_game(CreateGameRequest {
            name: "Loopback".to_string(),
            game_type: "impostor".to_string(),
            max_players: 4,
            min_players: 2,
            created_by: None,
            settings: GameSettings::default(),
        })
        .await
        .expect("Failed to create game")
        .id;

    let mut alice = connect(addr, "alice").await;
    let mut bob = connect(addr, "bob").await;

    send(&mut alice, json!({ "type": "join_game", "payload": { "game_id": game } })).await;
    let reply = next_of(&mut alice, "success").await;
    assert_eq!(reply["player_id"], "alice");

    send(&mut bob, json!({ "type": "join_game", "payload": { "game_id": game } })).await;
    next_of(&mut bob, "success").await;
    let joined = next_of(&mut alice, "player_joined").await;
    assert_eq!(joined["payload"]["player_id"], "bob");

    send(&mut bob, json!({ "type": "start_game", "payload": { "game_id": game } })).await;
    let alice_word = next_of(&mut alice, "player_word").await;
    let bob_word = next_of(&mut bob, "player_word").await;
    let roles = [
        alice_word["payload"]["role"].as_str(),
        bob_word["payload"]["role"].as_str(),
    ];
    assert_eq!(roles.iter().filter(|r| **r == Some("impostor")).count(), 1);

    drop(bob);
    let left = next_of(&mut alice, "player_left").await;
    assert_eq!(left["payload"]["player_id"], "bob");
    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_frame_closes_the_connection() {
    let (server, coordinator, addr) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;

    let padding = "x".repeat(2048);
    send(&mut alice, json!({ "type": "join_game", "payload": { "pad": padding } })).await;

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match alice.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server should close the socket");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(coordinator.hub().connection_count().await, 0);
    server.shutdown();
}
