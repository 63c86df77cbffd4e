//! Game rules: word catalog, settings validation, rounds and the round engine.
//!
//! Nothing in this module performs I/O. The session layer owns one
//! [`RoundEngine`] per room and turns its transitions into broadcasts.

pub mod catalog;
pub mod engine;
pub mod round;
pub mod settings;

pub use catalog::{Catalog, CatalogError, Category};
pub use engine::{EngineError, GameRules, RoundAdvance, RoundEngine};
pub use round::{Round, RoundView, VoteReceipt, VoteTally};
pub use settings::{
    validate_request, validate_settings, CreateGameRequest, GameSettings, SettingsError,
    IMPOSTOR_GAME_TYPE, MAX_ROOM_SIZE, MIN_TIME_PER_ROUND_SECS,
};
