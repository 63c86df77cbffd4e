//! Decoding of inbound frames and encoding of outbound ones.

use super::types::{ClientIntent, Envelope, ServerMessage};
use crate::types::PlayerId;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid message format: {0}")]
    Malformed(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

fn payload<T: DeserializeOwned>(envelope: Envelope) -> Result<T, ProtocolError> {
    serde_json::from_value(envelope.payload).map_err(|e| ProtocolError::InvalidPayload {
        kind: envelope.kind,
        reason: e.to_string(),
    })
}

/// Decodes one text frame into a typed intent.
///
/// # Arguments
///
/// * `text` - The raw frame text (expected to be a JSON envelope)
///
/// # Returns
///
/// The decoded [`ClientIntent`], or a [`ProtocolError`] if the frame is not
/// an envelope, names an unknown type, or carries a payload of the wrong shape.
pub fn decode_intent(text: &str) -> Result<ClientIntent, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = envelope.kind.clone();
    let intent = match kind.as_str() {
        "join_game" => ClientIntent::JoinGame(payload(envelope)?),
        "leave_game" => ClientIntent::LeaveGame(payload(envelope)?),
        "start_game" => ClientIntent::StartGame(payload(envelope)?),
        "end_game" => ClientIntent::EndGame(payload(envelope)?),
        "get_game_state" => ClientIntent::GetGameState(payload(envelope)?),
        "get_player_word" => ClientIntent::GetPlayerWord(payload(envelope)?),
        "vote" => ClientIntent::Vote(payload(envelope)?),
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };
    Ok(intent)
}

/// Encodes an outbound message as a text frame.
///
/// When `player_id` is given it is written into the envelope's `player_id`
/// field: the acting player for broadcasts, the recipient for direct replies.
pub fn encode_message(
    message: &ServerMessage,
    player_id: Option<&PlayerId>,
) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(message)?;
    if let (Some(player_id), Some(object)) = (player_id, value.as_object_mut()) {
        object.insert("player_id".to_string(), serde_json::Value::String(player_id.to_string()));
    }
    serde_json::to_string(&value)
}
