//! WebSocket upgrade with player identification.
//!
//! A client names itself with a `player_id` query parameter
//! (`ws://host/ws?player_id=alice`) or an `x-player-id` header. Requests
//! without one are answered with `400 Bad Request` and never upgraded.

use crate::connection::WsStream;
use crate::types::PlayerId;
use tokio::net::TcpStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use url::form_urlencoded;

/// Header accepted as an alternative to the query parameter.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Why a socket could not be upgraded.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("missing player_id")]
    MissingPlayerId,
    #[error("websocket handshake failed: {0}")]
    Protocol(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Extracts the player id from the upgrade request.
pub fn player_id_from_request(request: &Request) -> Option<PlayerId> {
    let from_query = request.uri().query().and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "player_id")
            .and_then(|(_, value)| PlayerId::parse(&value))
    });

    from_query.or_else(|| {
        request
            .headers()
            .get(PLAYER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(PlayerId::parse)
    })
}

fn bad_request(message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// Upgrades `stream`, requiring a player id.
pub async fn accept(stream: TcpStream) -> Result<(WsStream, PlayerId), HandshakeError> {
    let mut player = None;
    let callback = |request: &Request, response: Response| match player_id_from_request(request) {
        Some(id) => {
            player = Some(id);
            Ok(response)
        }
        None => Err(bad_request("player_id is required")),
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let player = player.ok_or(HandshakeError::MissingPlayerId)?;
    Ok((ws_stream, player))
}
