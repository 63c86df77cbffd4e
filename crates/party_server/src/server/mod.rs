//! Network server: listeners, accept loops and the WebSocket handshake.

pub mod core;
pub mod handshake;

pub use self::core::{bind_listener, GameServer};
pub use handshake::{player_id_from_request, HandshakeError, PLAYER_ID_HEADER};
