//! Per-room session state.

use crate::game::{GameRules, RoundEngine};
use crate::store::GameRecord;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A live room, guarded by one mutex so that at most one state transition
/// is in flight per room.
pub(crate) type SharedSession = Arc<Mutex<RoomSession>>;

#[derive(Debug)]
pub(crate) struct RoomSession {
    pub engine: RoundEngine,
    /// The durable record this session was opened from
    pub record: GameRecord,
    /// Set when the session is reaped; a closed session is never reused
    pub closed: bool,
    pub round_timer: Option<JoinHandle<()>>,
    pub relay_listener: Option<JoinHandle<()>>,
}

impl RoomSession {
    pub fn new(record: GameRecord, engine: RoundEngine) -> Self {
        Self {
            engine,
            record,
            closed: false,
            round_timer: None,
            relay_listener: None,
        }
    }

    /// Cancels the pending round timer, if any.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.round_timer.take() {
            timer.abort();
        }
    }

    /// Marks the session closed and stops its background tasks.
    pub fn close(&mut self) {
        self.closed = true;
        self.cancel_timer();
        if let Some(listener) = self.relay_listener.take() {
            listener.abort();
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Engine rules for a stored game.
pub(crate) fn rules_for(record: &GameRecord) -> GameRules {
    GameRules {
        min_players: record.min_players,
        max_players: record.max_players,
        settings: record.settings.clone(),
    }
}

/// Builds the engine for a stored game.
pub(crate) fn engine_for(record: &GameRecord, catalog: Arc<crate::game::Catalog>) -> RoundEngine {
    RoundEngine::new(record.id, rules_for(record), catalog)
}
