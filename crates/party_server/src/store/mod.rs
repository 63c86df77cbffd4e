//! Durable store boundary.
//!
//! The server never issues queries of its own. It calls the operations of
//! [`GameStore`] and treats the returned [`GameRecord`]s as the durable view of
//! each game; the live round state stays in memory with the room's engine.

pub mod memory;

pub use memory::InMemoryStore;

use crate::game::{CreateGameRequest, GameSettings, Round};
use crate::types::{PlayerId, RoomId, RoomStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store failures propagated to the session layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("game {0} not found")]
    NotFound(RoomId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The durable record of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: RoomId,
    pub name: String,
    #[serde(rename = "type")]
    pub game_type: String,
    pub status: RoomStatus,
    pub max_players: usize,
    pub min_players: usize,
    pub created_by: Option<String>,
    pub settings: GameSettings,
    pub players: Vec<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameRecord {
    /// Builds the initial record for a validated creation request.
    pub fn from_request(request: &CreateGameRequest) -> Self {
        let now = Utc::now();
        Self {
            id: RoomId::new(),
            name: request.name.trim().to_string(),
            game_type: request.game_type.clone(),
            status: RoomStatus::Waiting,
            max_players: request.max_players,
            min_players: request.min_players,
            created_by: request.created_by.clone(),
            settings: request.settings.clone(),
            players: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_joinable(&self) -> bool {
        self.status == RoomStatus::Waiting && self.players.len() < self.max_players
    }
}

/// Operations the server consumes from the durable store.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Health check used at startup.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Persists a new game in the `waiting` state.
    async fn create_game(&self, request: &CreateGameRequest) -> Result<GameRecord, StoreError>;

    async fn get_game(&self, game_id: RoomId) -> Result<GameRecord, StoreError>;

    /// Games that are waiting and not full, newest first.
    async fn list_joinable_games(&self) -> Result<Vec<GameRecord>, StoreError>;

    /// Adds a player to a game. Adding a present player is a no-op.
    async fn add_member(&self, game_id: RoomId, player_id: &PlayerId) -> Result<(), StoreError>;

    /// Removes a player from a game. Removing an absent player is a no-op.
    async fn remove_member(&self, game_id: RoomId, player_id: &PlayerId) -> Result<(), StoreError>;

    async fn update_status(&self, game_id: RoomId, status: RoomStatus) -> Result<(), StoreError>;

    /// Inserts or replaces a round of a game, keyed by round id.
    async fn record_round(&self, game_id: RoomId, round: &Round) -> Result<(), StoreError>;

    /// Every recorded round of a game, in round-number order.
    async fn rounds(&self, game_id: RoomId) -> Result<Vec<Round>, StoreError>;
}
