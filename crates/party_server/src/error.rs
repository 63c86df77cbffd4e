//! Error types for the party game server.
//!
//! [`SessionError`] is what the session coordinator reports back to a single
//! connection as an `error` message. Each variant carries a stable snake_case
//! code so clients can branch on it without parsing the message text.
//! [`ServerError`] covers startup and network failures of the server itself.

use crate::game::{EngineError, SettingsError};
use crate::hub::HubError;
use crate::messaging::ProtocolError;
use crate::store::StoreError;
use thiserror::Error;

/// Failures raised while handling one client intent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotJoinable(String),
    #[error("game is full ({max} players)")]
    RoomFull { max: usize },
    #[error("not enough players to start game ({have} of {need})")]
    InsufficientPlayers { have: usize, need: usize },
    #[error("round is not the current round")]
    StaleRound,
    #[error("you already voted this round")]
    DuplicateVote,
    #[error("unknown vote target {0}")]
    UnknownTarget(String),
    #[error("voting is disabled for this game")]
    VotingDisabled,
    #[error("you are not in this game")]
    NotInRoom,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable machine-readable code sent in the `error` payload.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Validation(_) => "validation_error",
            SessionError::NotJoinable(_) => "not_joinable",
            SessionError::RoomFull { .. } => "room_full",
            SessionError::InsufficientPlayers { .. } => "insufficient_players",
            SessionError::StaleRound => "stale_round",
            SessionError::DuplicateVote => "duplicate_vote",
            SessionError::UnknownTarget(_) => "unknown_target",
            SessionError::VotingDisabled => "voting_disabled",
            SessionError::NotInRoom => "not_in_room",
            SessionError::NotFound(_) => "not_found",
            SessionError::Conflict(_) => "conflict",
            SessionError::StoreUnavailable(_) => "store_unavailable",
            SessionError::Internal(_) => "internal_error",
        }
    }
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InsufficientPlayers { have, need } => {
                SessionError::InsufficientPlayers { have, need }
            }
            EngineError::AlreadyStarted => SessionError::NotJoinable(err.to_string()),
            EngineError::NoActiveRound => SessionError::NotFound(err.to_string()),
            EngineError::StaleRound(_) => SessionError::StaleRound,
            EngineError::DuplicateVote(_) => SessionError::DuplicateVote,
            EngineError::UnknownTarget(target) => SessionError::UnknownTarget(target.to_string()),
            EngineError::NotAMember(_) => SessionError::NotInRoom,
            EngineError::VotingDisabled => SessionError::VotingDisabled,
            EngineError::EmptyCatalog => SessionError::Internal(err.to_string()),
        }
    }
}

impl From<HubError> for SessionError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::RoomFull { max, .. } => SessionError::RoomFull { max },
            HubError::RoomNotJoinable { .. } => SessionError::NotJoinable(err.to_string()),
            HubError::RoomNotFound(_) => SessionError::NotFound(err.to_string()),
            HubError::NotConnected(_) => SessionError::Internal(err.to_string()),
        }
    }
}

impl From<SettingsError> for SessionError {
    fn from(err: SettingsError) -> Self {
        SessionError::Validation(err.to_string())
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        SessionError::Validation(err.to_string())
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => SessionError::NotFound(err.to_string()),
            StoreError::Conflict(_) => SessionError::Conflict(err.to_string()),
            StoreError::Unavailable(reason) => SessionError::StoreUnavailable(reason),
        }
    }
}

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Startup check failed: {0}")]
    Startup(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlayerId, RoomId, RoomStatus, RoundId};

    #[test]
    fn engine_errors_map_to_taxonomy_codes() {
        let voter = PlayerId::parse("ann").unwrap();
        assert_eq!(SessionError::from(EngineError::DuplicateVote(voter.clone())).code(), "duplicate_vote");
        assert_eq!(SessionError::from(EngineError::StaleRound(RoundId::new())).code(), "stale_round");
        assert_eq!(SessionError::from(EngineError::UnknownTarget(voter)).code(), "unknown_target");
        assert_eq!(
            SessionError::from(EngineError::InsufficientPlayers { have: 2, need: 3 }).code(),
            "insufficient_players"
        );
        assert_eq!(SessionError::from(EngineError::AlreadyStarted).code(), "not_joinable");
    }

    #[test]
    fn hub_and_store_errors_map_to_taxonomy_codes() {
        let room = RoomId::new();
        assert_eq!(SessionError::from(HubError::RoomFull { room, max: 4 }).code(), "room_full");
        assert_eq!(
            SessionError::from(HubError::RoomNotJoinable { room, status: RoomStatus::Active }).code(),
            "not_joinable"
        );
        assert_eq!(SessionError::from(StoreError::NotFound(room)).code(), "not_found");
        assert_eq!(
            SessionError::from(StoreError::Unavailable("down".into())).code(),
            "store_unavailable"
        );
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(SessionError::RoomFull { max: 4 }.to_string(), "game is full (4 players)");
        assert_eq!(
            SessionError::InsufficientPlayers { have: 2, need: 3 }.to_string(),
            "not enough players to start game (2 of 3)"
        );
    }
}
