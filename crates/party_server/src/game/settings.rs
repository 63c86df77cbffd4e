//! Game settings and their validation.
//!
//! Settings are checked once, when a game is created, so a room can never be
//! built around invalid rules. The round engine trusts what it is given.

use super::catalog::Catalog;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest round the game allows, in seconds.
pub const MIN_TIME_PER_ROUND_SECS: u64 = 30;

/// Largest room the game allows.
pub const MAX_ROOM_SIZE: usize = 20;

/// The only game type currently served.
pub const IMPOSTOR_GAME_TYPE: &str = "impostor";

/// Per-game rules chosen by the creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    /// Category whitelist; empty means every category in the catalog
    #[serde(default)]
    pub categories: Vec<String>,
    /// Number of rounds to play
    pub rounds: u32,
    /// Time budget per round in seconds
    pub time_per_round: u64,
    /// Whether players vote for the impostor each round
    #[serde(default = "default_voting_enabled")]
    pub voting_enabled: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            rounds: 3,
            time_per_round: 120,
            voting_enabled: default_voting_enabled(),
        }
    }
}

fn default_voting_enabled() -> bool {
    true
}

/// Request to create a new game, as received from the request/response layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub name: String,
    #[serde(rename = "type", default = "default_game_type")]
    pub game_type: String,
    pub max_players: usize,
    pub min_players: usize,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub settings: GameSettings,
}

fn default_game_type() -> String {
    IMPOSTOR_GAME_TYPE.to_string()
}

/// Reasons a game cannot be created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("rounds must be at least 1")]
    TooFewRounds,
    #[error("time per round must be at least 30 seconds (got {0})")]
    RoundTooShort(u64),
    #[error("invalid category: {0}")]
    UnknownCategory(String),
    #[error("unsupported game type: {0}")]
    UnsupportedGameType(String),
    #[error("game name must be between 2 and 100 characters")]
    InvalidName,
    #[error("invalid player limits: min {min}, max {max}")]
    InvalidPlayerLimits { min: usize, max: usize },
}

/// Validates round count, per-round time budget and category whitelist.
///
/// # Errors
///
/// * [`SettingsError::TooFewRounds`] when `rounds < 1`
/// * [`SettingsError::RoundTooShort`] when `time_per_round < 30`
/// * [`SettingsError::UnknownCategory`] for the first whitelist entry missing
///   from `catalog`
pub fn validate_settings(settings: &GameSettings, catalog: &Catalog) -> Result<(), SettingsError> {
    if settings.rounds < 1 {
        return Err(SettingsError::TooFewRounds);
    }
    if settings.time_per_round < MIN_TIME_PER_ROUND_SECS {
        return Err(SettingsError::RoundTooShort(settings.time_per_round));
    }
    if let Some(unknown) = settings.categories.iter().find(|key| !catalog.contains(key)) {
        return Err(SettingsError::UnknownCategory(unknown.clone()));
    }
    Ok(())
}

/// Validates a full creation request: name, type, player limits, then settings.
pub fn validate_request(request: &CreateGameRequest, catalog: &Catalog) -> Result<(), SettingsError> {
    let name_len = request.name.trim().chars().count();
    if !(2..=100).contains(&name_len) {
        return Err(SettingsError::InvalidName);
    }
    if request.game_type != IMPOSTOR_GAME_TYPE {
        return Err(SettingsError::UnsupportedGameType(request.game_type.clone()));
    }
    if request.min_players < 2
        || request.min_players > request.max_players
        || request.max_players > MAX_ROOM_SIZE
    {
        return Err(SettingsError::InvalidPlayerLimits {
            min: request.min_players,
            max: request.max_players,
        });
    }
    validate_settings(&request.settings, catalog)
}
