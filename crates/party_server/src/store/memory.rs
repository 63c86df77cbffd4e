//! In-process [`GameStore`] implementation.
//!
//! Used by the binary when no external store is configured and by tests. It
//! can be told to report itself unavailable, or to fail a number of upcoming
//! writes, to exercise the server's degraded paths.

use super::{GameRecord, GameStore, StoreError};
use crate::game::{CreateGameRequest, Round};
use crate::types::{PlayerId, RoomId, RoomStatus};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct InMemoryStore {
    games: DashMap<RoomId, GameRecord>,
    rounds: DashMap<RoomId, Vec<Round>>,
    available: AtomicBool,
    failing_writes: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            games: DashMap::new(),
            rounds: DashMap::new(),
            available: AtomicBool::new(true),
            failing_writes: AtomicUsize::new(0),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with [`StoreError::Unavailable`] while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes the next `count` write operations fail with [`StoreError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.check_available()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn update<F>(&self, game_id: RoomId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut GameRecord) -> Result<(), StoreError>,
    {
        self.check_write()?;
        let mut record = self.games.get_mut(&game_id).ok_or(StoreError::NotFound(game_id))?;
        apply(&mut *record)?;
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl GameStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn create_game(&self, request: &CreateGameRequest) -> Result<GameRecord, StoreError> {
        self.check_write()?;
        let record = GameRecord::from_request(request);
        self.games.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_game(&self, game_id: RoomId) -> Result<GameRecord, StoreError> {
        self.check_available()?;
        self.games
            .get(&game_id)
            .map(|record| record.clone())
            .ok_or(StoreError::NotFound(game_id))
    }

    async fn list_joinable_games(&self) -> Result<Vec<GameRecord>, StoreError> {
        self.check_available()?;
        let mut games: Vec<GameRecord> = self
            .games
            .iter()
            .filter(|entry| entry.is_joinable())
            .map(|entry| entry.value().clone())
            .collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(games)
    }

    async fn add_member(&self, game_id: RoomId, player_id: &PlayerId) -> Result<(), StoreError> {
        self.update(game_id, |record| {
            if record.players.contains(player_id) {
                return Ok(());
            }
            if record.players.len() >= record.max_players {
                return Err(StoreError::Conflict(format!("game {} is full", game_id)));
            }
            record.players.push(player_id.clone());
            Ok(())
        })
    }

    async fn remove_member(&self, game_id: RoomId, player_id: &PlayerId) -> Result<(), StoreError> {
        self.update(game_id, |record| {
            record.players.retain(|player| player != player_id);
            Ok(())
        })
    }

    async fn update_status(&self, game_id: RoomId, status: RoomStatus) -> Result<(), StoreError> {
        self.update(game_id, |record| {
            record.status = status;
            Ok(())
        })
    }

    async fn record_round(&self, game_id: RoomId, round: &Round) -> Result<(), StoreError> {
        self.check_write()?;
        if !self.games.contains_key(&game_id) {
            return Err(StoreError::NotFound(game_id));
        }
        let mut rounds = self.rounds.entry(game_id).or_default();
        match rounds.iter_mut().find(|existing| existing.id() == round.id()) {
            Some(existing) => *existing = round.clone(),
            None => rounds.push(round.clone()),
        }
        rounds.sort_by_key(|r| r.number());
        Ok(())
    }

    async fn rounds(&self, game_id: RoomId) -> Result<Vec<Round>, StoreError> {
        self.check_available()?;
        if !self.games.contains_key(&game_id) {
            return Err(StoreError::NotFound(game_id));
        }
        Ok(self.rounds.get(&game_id).map(|r| r.clone()).unwrap_or_default())
    }
}
