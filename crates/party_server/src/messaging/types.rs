//! Message type definitions for client-server communication.
//!
//! Every frame on the wire is a JSON envelope:
//!
//! ```json
//! { "type": "vote", "payload": { "game_id": "...", "round_id": "...", "voted_for_id": "bob" }, "player_id": "alice" }
//! ```
//!
//! Inbound frames are decoded once into a [`ClientIntent`]; outbound frames
//! are built from a [`ServerMessage`]. Nothing past the codec looks at raw
//! JSON.

use crate::game::{RoundView, VoteTally};
use crate::store::GameRecord;
use crate::types::{PlayerId, Role, RoomId, RoomStatus, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The raw wire envelope, before the payload is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind, e.g. `"join_game"`
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific payload
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Optional player id; the connection's own identity always wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

/// Payload naming a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRef {
    pub game_id: RoomId,
}

/// Payload of `end_game`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndGameRequest {
    pub game_id: RoomId,
    /// Finish the whole game instead of only the current round
    #[serde(default)]
    pub finish: bool,
}

/// Payload of `vote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub game_id: RoomId,
    pub round_id: RoundId,
    pub voted_for_id: PlayerId,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIntent {
    JoinGame(GameRef),
    LeaveGame(GameRef),
    StartGame(GameRef),
    EndGame(EndGameRequest),
    GetGameState(GameRef),
    GetPlayerWord(GameRef),
    Vote(VoteRequest),
}

impl ClientIntent {
    /// The game this intent targets.
    pub fn game_id(&self) -> RoomId {
        match self {
            ClientIntent::JoinGame(r)
            | ClientIntent::LeaveGame(r)
            | ClientIntent::StartGame(r)
            | ClientIntent::GetGameState(r)
            | ClientIntent::GetPlayerWord(r) => r.game_id,
            ClientIntent::EndGame(r) => r.game_id,
            ClientIntent::Vote(r) => r.game_id,
        }
    }

    /// Wire name of the intent.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientIntent::JoinGame(_) => "join_game",
            ClientIntent::LeaveGame(_) => "leave_game",
            ClientIntent::StartGame(_) => "start_game",
            ClientIntent::EndGame(_) => "end_game",
            ClientIntent::GetGameState(_) => "get_game_state",
            ClientIntent::GetPlayerWord(_) => "get_player_word",
            ClientIntent::Vote(_) => "vote",
        }
    }
}

/// `player_joined` / `player_left`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    pub game_id: RoomId,
    pub player_id: PlayerId,
    pub player_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStarted {
    pub game_id: RoomId,
    pub players: Vec<PlayerId>,
    pub rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStarted {
    pub game_id: RoomId,
    pub round: RoundView,
}

/// The finished round with its secret and impostor revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEnded {
    pub game_id: RoomId,
    pub round: RoundView,
    pub scores: BTreeMap<PlayerId, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecorded {
    pub game_id: RoomId,
    pub round_id: RoundId,
    pub voter_id: PlayerId,
    pub voted_for_id: PlayerId,
    pub votes_cast: usize,
    pub votes_needed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResults {
    pub game_id: RoomId,
    pub round_id: RoundId,
    pub counts: BTreeMap<PlayerId, usize>,
    pub accused: Option<PlayerId>,
    pub impostor_id: PlayerId,
    pub impostor_caught: bool,
}

impl VoteResults {
    pub fn new(game_id: RoomId, tally: VoteTally) -> Self {
        Self {
            game_id,
            round_id: tally.round_id,
            counts: tally.counts,
            accused: tally.accused,
            impostor_id: tally.impostor_id,
            impostor_caught: tally.impostor_caught,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEnded {
    pub game_id: RoomId,
    pub rounds_played: usize,
    pub scores: BTreeMap<PlayerId, u32>,
}

/// One roster entry in a state view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStanding {
    pub player_id: PlayerId,
    pub score: u32,
}

/// Reply to `get_game_state`.
///
/// `current_round` never carries the secret or the impostor; `rounds` lists
/// finished rounds with both revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub game: GameRecord,
    pub status: RoomStatus,
    pub players: Vec<PlayerStanding>,
    pub current_round: Option<RoundView>,
    pub rounds: Vec<RoundView>,
}

/// The recipient's private view of the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerWord {
    pub game_id: RoomId,
    pub round_id: RoundId,
    pub round_number: u32,
    pub category: String,
    pub role: Role,
    /// `null` for the impostor
    pub word: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
}

/// A message sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    PlayerJoined(MembershipChange),
    PlayerLeft(MembershipChange),
    GameStarted(GameStarted),
    GameEnded(GameEnded),
    RoundStarted(RoundStarted),
    RoundEnded(RoundEnded),
    GameState(Box<GameState>),
    PlayerWord(PlayerWord),
    VoteRecorded(VoteRecorded),
    VoteResults(VoteResults),
    Success(Ack),
    Error(ErrorNotice),
}

impl ServerMessage {
    pub fn success(message: impl Into<String>) -> Self {
        ServerMessage::Success(Ack { message: message.into() })
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorNotice {
            code: code.into(),
            message: message.into(),
        })
    }
}
