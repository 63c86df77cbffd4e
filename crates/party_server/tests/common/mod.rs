//! Shared harness: in-process connections driven straight through the coordinator.
#![allow(dead_code)]

use party_server::connection::{Connection, Outbound};
use party_server::{
    Catalog, CreateGameRequest, GameSettings, Hub, InMemoryStore, LocalRelay, PlayerId, RoomId,
    SessionCoordinator, SessionOptions,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// One coordinator with handles on its in-memory collaborators.
pub struct Instance {
    pub coordinator: Arc<SessionCoordinator>,
    pub store: Arc<InMemoryStore>,
    pub relay: Arc<LocalRelay>,
}

impl Instance {
    pub fn new(options: SessionOptions) -> Self {
        Self::with_backends(Arc::new(InMemoryStore::new()), Arc::new(LocalRelay::new()), options)
    }

    /// A coordinator sharing `store` and `relay` with others, like a second server process.
    pub fn with_backends(store: Arc<InMemoryStore>, relay: Arc<LocalRelay>, options: SessionOptions) -> Self {
        let coordinator = SessionCoordinator::new(
            Arc::new(Hub::new()),
            store.clone(),
            relay.clone(),
            Arc::new(Catalog::builtin()),
            options,
        );
        Self {
            coordinator,
            store,
            relay,
        }
    }

    pub fn without_timers() -> Self {
        Self::new(SessionOptions { round_timers: false })
    }

    pub async fn create_game(&self, min_players: usize, max_players: usize, settings: GameSettings) -> RoomId {
        let request = CreateGameRequest {
            name: "Friday night".to_string(),
            game_type: "impostor".to_string(),
            max_players,
            min_players,
            created_by: Some("alice".to_string()),
            settings,
        };
        self.coordinator
            .create_game(request)
            .await
            .expect("Failed to create game")
            .id
    }

    pub async fn connect(&self, player: &str) -> Client {
        let player_id = PlayerId::parse(player).expect("valid player id");
        let (connection, outbound) = Connection::new(player_id, 256);
        self.coordinator.hub().register(connection.clone()).await;
        Client {
            coordinator: self.coordinator.clone(),
            connection,
            outbound,
            backlog: VecDeque::new(),
        }
    }
}

/// A player's connection with its outbound queue exposed.
pub struct Client {
    pub coordinator: Arc<SessionCoordinator>,
    pub connection: Arc<Connection>,
    pub outbound: Outbound,
    /// Frames passed over while waiting for a reply
    backlog: VecDeque<Value>,
}

fn is_reply(value: &Value) -> bool {
    value["type"] == "success" || value["type"] == "error"
}

impl Client {
    pub fn player(&self) -> &str {
        self.connection.player_id().as_str()
    }

    pub async fn send(&self, frame: Value) {
        self.coordinator.handle_frame(&self.connection, &frame.to_string()).await;
    }

    pub async fn send_raw(&self, text: &str) {
        self.coordinator.handle_frame(&self.connection, text).await;
    }

    pub async fn join(&mut self, game: RoomId) -> Value {
        self.send(json!({ "type": "join_game", "payload": { "game_id": game } })).await;
        self.expect_reply().await
    }

    pub async fn start(&mut self, game: RoomId) -> Value {
        self.send(json!({ "type": "start_game", "payload": { "game_id": game } })).await;
        self.expect_reply().await
    }

    pub async fn vote(&mut self, game: RoomId, round_id: &Value, target: &str) -> Value {
        self.send(json!({
            "type": "vote",
            "payload": { "game_id": game, "round_id": round_id, "voted_for_id": target }
        }))
        .await;
        self.expect_reply().await
    }

    /// Every frame queued so far.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames: Vec<Value> = self.backlog.drain(..).collect();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("outbound frames are JSON"));
        }
        frames
    }

    fn from_backlog(&mut self, kind: &str) -> Option<Value> {
        while let Some(value) = self.backlog.pop_front() {
            if value["type"] == kind {
                return Some(value);
            }
        }
        None
    }

    /// Waits for the next frame of `kind`, skipping others.
    pub async fn next_of(&mut self, kind: &str) -> Value {
        if let Some(value) = self.from_backlog(kind) {
            return value;
        }
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
                .expect("outbound queue closed");
            let value: Value = serde_json::from_str(&frame).expect("outbound frames are JSON");
            if value["type"] == kind {
                return value;
            }
        }
    }

    /// Like [`next_of`](Self::next_of) with a custom deadline.
    pub async fn next_of_within(&mut self, kind: &str, deadline: Duration) -> Value {
        tokio::time::timeout(deadline, self.next_of_forever(kind))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
    }

    async fn next_of_forever(&mut self, kind: &str) -> Value {
        if let Some(value) = self.from_backlog(kind) {
            return value;
        }
        while let Some(frame) = self.outbound.recv().await {
            let value: Value = serde_json::from_str(&frame).expect("outbound frames are JSON");
            if value["type"] == kind {
                return value;
            }
        }
        panic!("outbound queue closed while waiting for {kind}");
    }

    /// Waits for the next `success` or `error` frame, keeping the others for later.
    pub async fn expect_reply(&mut self) -> Value {
        if let Some(position) = self.backlog.iter().position(is_reply) {
            return self.backlog.remove(position).expect("position is in range");
        }
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
                .await
                .expect("timed out waiting for a reply")
                .expect("outbound queue closed");
            let value: Value = serde_json::from_str(&frame).expect("outbound frames are JSON");
            if is_reply(&value) {
                return value;
            }
            self.backlog.push_back(value);
        }
    }
}

pub fn kinds(frames: &[Value]) -> Vec<&str> {
    frames.iter().filter_map(|frame| frame["type"].as_str()).collect()
}

pub fn error_code(reply: &Value) -> &str {
    assert_eq!(reply["type"], "error", "expected an error reply, got {reply}");
    reply["payload"]["code"].as_str().unwrap_or_default()
}

pub fn assert_success(reply: &Value) {
    assert_eq!(reply["type"], "success", "expected a success reply, got {reply}");
}

pub fn settings(rounds: u32) -> GameSettings {
    GameSettings {
        rounds,
        ..Default::default()
    }
}
