//! # Party Server
//!
//! Real-time server for small social-deduction party games. Players connect
//! over WebSocket, gather in rooms, and play rounds in which everyone but one
//! secret impostor learns a word from a category; the room then votes on who
//! the impostor was.
//!
//! ## Architecture Overview
//!
//! * **Hub** ([`Hub`]) - live connections, room membership and fan-out
//! * **Round Engine** ([`RoundEngine`]) - pure per-room game rules
//! * **Session Coordinator** ([`SessionCoordinator`]) - decodes intents, drives
//!   the engine under the room lock, broadcasts and persists the results
//! * **Store** ([`GameStore`]) - durable game records and finished rounds
//! * **Relay** ([`Relay`]) - mirrors room broadcasts between server instances
//!
//! ### Message Flow
//!
//! 1. Client sends a text frame `{"type": ..., "payload": {...}}`
//! 2. The connection's read loop hands it to the coordinator
//! 3. The coordinator validates it and applies it to the room's engine
//! 4. Resulting events are broadcast to the room and published to the relay
//! 5. The sender receives `success` or an `error` with a stable code
//!
//! ## Thread Safety
//!
//! * The hub guards its maps with `tokio::sync::RwLock`, acquired in a fixed
//!   order (connections, rooms, then one room)
//! * Each live room is serialized by one `tokio::sync::Mutex`
//! * Outbound traffic goes through bounded per-connection queues; a full
//!   queue drops the connection instead of stalling the room

pub use config::ServerConfig;
pub use error::{ServerError, SessionError};
pub use game::{Catalog, Category, CreateGameRequest, GameSettings, RoundEngine};
pub use hub::{Hub, HubError};
pub use relay::{LocalRelay, Relay};
pub use server::GameServer;
pub use session::{SessionCoordinator, SessionOptions};
pub use store::{GameRecord, GameStore, InMemoryStore};
pub use types::{InstanceId, PlayerId, Role, RoomId, RoomStatus, RoundId, RoundStatus};
pub use utils::{create_coordinator, create_server, create_server_with_config};

pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod hub;
pub mod messaging;
pub mod relay;
pub mod server;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;
