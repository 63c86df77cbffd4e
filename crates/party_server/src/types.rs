//! # Core Type Definitions
//!
//! Identifiers and small status enums shared by every layer of the server.
//!
//! ## Key Types
//!
//! - [`PlayerId`] - Identity supplied by the client when it connects
//! - [`RoomId`] - Identifier of a game room (the durable game record id)
//! - [`RoundId`] - Identifier of one round inside a room
//! - [`ConnectionId`] - Process-local identifier of one live socket
//! - [`RoomStatus`], [`RoundStatus`], [`Role`] - lifecycle states
//!
//! Wrapper types keep the different kinds of ids from being mixed up and all
//! of them serialize transparently so the wire format stays plain strings.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identity of a player.
///
/// Player ids are supplied out-of-band at connection time (query parameter or
/// header) and are opaque to the server apart from being non-empty.
///
/// # Examples
///
/// ```rust
/// use party_server::PlayerId;
///
/// let player = PlayerId::parse("alice").expect("non-empty id");
/// assert_eq!(player.as_str(), "alice");
/// assert!(PlayerId::parse("   ").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Parses a player id, rejecting empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a game room.
///
/// A room shares its id with the durable game record it was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Creates a new random room ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub Uuid);

impl RoundId {
    /// Creates a new random round ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-local identifier for one live connection.
///
/// Two sockets opened by the same player get different connection ids, which
/// is how the hub tells a replaced connection apart from its successor.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next connection id.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifier of one server process, used to tag relayed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Accepting members, no round has started yet.
    Waiting,
    /// Rounds are being played; joins are refused.
    Active,
    /// Terminal.
    Finished,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Active => "active",
            RoomStatus::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Lifecycle of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Active,
    Voting,
    Finished,
}

/// Role a player holds in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Impostor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_rejects_blank_input() {
        assert!(PlayerId::parse("").is_none());
        assert!(PlayerId::parse(" \t").is_none());
        assert_eq!(PlayerId::parse(" bob ").unwrap().as_str(), "bob");
    }

    #[test]
    fn ids_serialize_transparently() {
        let player = PlayerId::parse("carol").unwrap();
        assert_eq!(serde_json::to_string(&player).unwrap(), "\"carol\"");

        let room = RoomId::new();
        let json = serde_json::to_string(&room).unwrap();
        assert_eq!(json, format!("\"{}\"", room.0));
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, room);
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = next_connection_id();
        let b = next_connection_id();
        assert_ne!(a, b);
    }

    #[test]
    fn statuses_use_snake_case() {
        assert_eq!(serde_json::to_string(&RoomStatus::Waiting).unwrap(), "\"waiting\"");
        assert_eq!(serde_json::to_string(&Role::Impostor).unwrap(), "\"impostor\"");
        assert_eq!(RoomStatus::Finished.to_string(), "finished");
    }
}
