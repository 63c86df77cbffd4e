//! Session coordination.
//!
//! The [`SessionCoordinator`] is the only component that talks to both the
//! game rules and the transport. For every decoded client intent it runs one
//! round-engine or hub operation under the room's lock, broadcasts the
//! resulting event to the room (and the relay), and persists round-boundary
//! events to the store. Failures are reported to the originating connection
//! only.
//!
//! # Locking
//!
//! Each live room has one [`tokio::sync::Mutex`] around its [`RoundEngine`].
//! Handlers hold it across the engine call *and* the broadcasts that follow,
//! so members observe a room's events in the order the transitions happened.
//! The session map lock is never held while waiting on a room lock.
//!
//! [`RoundEngine`]: crate::game::RoundEngine

mod handlers;
mod room;

use crate::connection::Connection;
use crate::error::{ServerError, SessionError};
use crate::game::{validate_request, Catalog, CreateGameRequest};
use crate::hub::Hub;
use crate::messaging::{decode_intent, encode_message, ClientIntent, ServerMessage};
use crate::relay::{Relay, RelayEnvelope};
use crate::store::{GameRecord, GameStore, StoreError};
use crate::types::{InstanceId, PlayerId, RoomId, RoomStatus, RoundId};
use futures::StreamExt;
use room::{engine_for, RoomSession, SharedSession};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

type SessionGuard = OwnedMutexGuard<RoomSession>;

/// Tunables for the coordinator.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// End rounds automatically after the game's `time_per_round`
    pub round_timers: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { round_timers: true }
    }
}

/// Glue between client intents, the round engines, the hub, the store and the relay.
pub struct SessionCoordinator {
    hub: Arc<Hub>,
    store: Arc<dyn GameStore>,
    relay: Arc<dyn Relay>,
    catalog: Arc<Catalog>,
    sessions: RwLock<HashMap<RoomId, SharedSession>>,
    origin: InstanceId,
    options: SessionOptions,
    /// Handle to ourselves for spawned round timers
    this: Weak<SessionCoordinator>,
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("origin", &self.origin)
            .field("options", &self.options)
            .finish()
    }
}

impl SessionCoordinator {
    /// Creates a coordinator around a hub and its external collaborators.
    ///
    /// # Arguments
    ///
    /// * `hub` - Registry of live connections and room membership
    /// * `store` - Durable game records
    /// * `relay` - Cross-process event fan-out
    /// * `catalog` - Word categories rounds are drawn from
    /// * `options` - Behaviour switches
    pub fn new(
        hub: Arc<Hub>,
        store: Arc<dyn GameStore>,
        relay: Arc<dyn Relay>,
        catalog: Arc<Catalog>,
        options: SessionOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            hub,
            store,
            relay,
            catalog,
            sessions: RwLock::new(HashMap::new()),
            origin: InstanceId::new(),
            options,
            this: this.clone(),
        })
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Id stamped on every event this instance publishes to the relay.
    pub fn origin(&self) -> InstanceId {
        self.origin
    }

    /// Number of rooms with a live session on this instance.
    pub async fn live_rooms(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Verifies the store and the relay are reachable.
    ///
    /// Called once at startup; a failure must abort startup.
    pub async fn health_check(&self) -> Result<(), ServerError> {
        self.store
            .ping()
            .await
            .map_err(|e| ServerError::Startup(format!("store: {e}")))?;
        self.relay
            .ping()
            .await
            .map_err(|e| ServerError::Startup(format!("relay: {e}")))?;
        info!("✅ Store and relay reachable");
        Ok(())
    }

    /// Validates and persists a new game.
    ///
    /// This is the entry point for the request/response layer; settings are
    /// checked here so that no room is ever built around invalid rules.
    pub async fn create_game(&self, request: CreateGameRequest) -> Result<GameRecord, SessionError> {
        validate_request(&request, &self.catalog)?;
        let record = self.store.create_game(&request).await?;
        info!("🎲 Created game '{}' ({})", record.name, record.id);
        Ok(record)
    }

    pub async fn list_joinable_games(&self) -> Result<Vec<GameRecord>, SessionError> {
        Ok(self.store.list_joinable_games().await?)
    }

    /// Handles one inbound text frame from `connection`.
    pub async fn handle_frame(&self, connection: &Arc<Connection>, text: &str) {
        let intent = match decode_intent(text) {
            Ok(intent) => intent,
            Err(e) => {
                debug!("Rejected frame from {}: {}", connection.player_id(), e);
                self.reply_error(connection, &SessionError::from(e)).await;
                return;
            }
        };

        debug!(
            "📨 {} from player {} for game {}",
            intent.kind(),
            connection.player_id(),
            intent.game_id()
        );

        let result = match intent {
            ClientIntent::JoinGame(r) => self.join_game(connection, r.game_id).await,
            ClientIntent::LeaveGame(r) => self.leave_game(connection, r.game_id).await,
            ClientIntent::StartGame(r) => self.start_game(connection, r.game_id).await,
            ClientIntent::EndGame(r) => self.end_game(connection, r.game_id, r.finish).await,
            ClientIntent::GetGameState(r) => self.game_state(r.game_id).await,
            ClientIntent::GetPlayerWord(r) => self.player_word(connection.player_id(), r.game_id).await,
            ClientIntent::Vote(r) => {
                self.vote(connection, r.game_id, r.round_id, &r.voted_for_id).await
            }
        };

        match result {
            Ok(reply) => self.reply(connection, &reply).await,
            Err(e) => self.reply_error(connection, &e).await,
        }
    }

    /// Tears down a connection whose workers have stopped.
    ///
    /// The player leaves its room exactly as with `leave_game`, unless a newer
    /// connection for the same player has already taken over the membership.
    pub async fn disconnect(&self, connection: &Arc<Connection>) {
        if let Some(room_id) = connection.take_room() {
            if let Err(e) = self.depart(connection, room_id).await {
                warn!("Departure of {} from game {} failed: {}", connection.player_id(), room_id, e);
            }
        }
        self.hub.unregister(connection).await;
    }

    /// Closes every live session; used at shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<(RoomId, SharedSession)> = self.sessions.write().await.drain().collect();
        for (room_id, session) in sessions {
            let mut session = session.lock().await;
            session.close();
            self.hub.close_room(room_id).await;
        }
        self.hub.shutdown().await;
    }

    // ------------------------------------------------------------------
    // Session lookup and lifecycle
    // ------------------------------------------------------------------

    /// Locks the live session of a room, if there is one.
    async fn live_session(&self, room_id: RoomId) -> Option<SessionGuard> {
        loop {
            let session = self.sessions.read().await.get(&room_id).cloned()?;
            let guard = session.clone().lock_owned().await;
            if !guard.closed {
                return Some(guard);
            }
            // Reaped while we waited; a replacement may exist by now.
            let replaced = self
                .sessions
                .read()
                .await
                .get(&room_id)
                .is_some_and(|current| !Arc::ptr_eq(current, &session));
            if !replaced {
                return None;
            }
        }
    }

    /// Locks the session of a room, opening one from its record if needed.
    async fn open_session(&self, record: &GameRecord) -> Result<SessionGuard, SessionError> {
        loop {
            if let Some(guard) = self.live_session(record.id).await {
                return Ok(guard);
            }
            if record.status != RoomStatus::Waiting {
                return Err(SessionError::NotJoinable(format!(
                    "game {} is not accepting players (status: {})",
                    record.id, record.status
                )));
            }

            let events = match self.relay.subscribe(record.id).await {
                Ok(events) => Some(events),
                Err(e) => {
                    warn!("📡 Relay subscribe for game {} failed: {}", record.id, e);
                    None
                }
            };

            let session = Arc::new(Mutex::new(RoomSession::new(
                record.clone(),
                engine_for(record, self.catalog.clone()),
            )));
            let Ok(mut guard) = session.clone().try_lock_owned() else {
                continue;
            };
            {
                let mut sessions = self.sessions.write().await;
                if sessions.contains_key(&record.id) {
                    continue;
                }
                sessions.insert(record.id, session);
            }

            self.hub.open_room(record.id, record.max_players).await;
            guard.relay_listener = events.map(|events| self.spawn_relay_listener(record.id, events));
            info!("🏠 Opened game {} ('{}')", record.id, record.name);
            return Ok(guard);
        }
    }

    /// Re-injects relayed events from other instances into the local room.
    fn spawn_relay_listener(
        &self,
        room_id: RoomId,
        mut events: futures::stream::BoxStream<'static, RelayEnvelope>,
    ) -> tokio::task::JoinHandle<()> {
        let hub = self.hub.clone();
        let origin = self.origin;
        tokio::spawn(async move {
            while let Some(envelope) = events.next().await {
                if envelope.origin == origin || envelope.room_id != room_id {
                    continue;
                }
                hub.broadcast(room_id, envelope.frame.into()).await;
            }
            debug!("Relay listener for game {} stopped", room_id);
        })
    }

    /// Retires a room: closes the session, drops hub membership and stops timers.
    async fn reap(&self, room_id: RoomId, session: &mut SessionGuard) {
        session.close();
        self.sessions.write().await.remove(&room_id);
        let detached = self.hub.close_room(room_id).await;
        info!("🧹 Reaped game {} ({} member(s) detached)", room_id, detached.len());
    }

    /// Schedules the expiry of `round_id` after the game's round time.
    fn schedule_round_timer(&self, room_id: RoomId, round_id: RoundId, session: &mut SessionGuard) {
        session.cancel_timer();
        if !self.options.round_timers {
            return;
        }
        let duration = Duration::from_secs(session.engine.rules().settings.time_per_round);
        let this = self.this.clone();
        session.round_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(coordinator) = this.upgrade() {
                coordinator.expire_round(room_id, round_id).await;
            }
        }));
    }

    /// Ends `round_id` because its time ran out, if it is still in play.
    pub async fn expire_round(&self, room_id: RoomId, round_id: RoundId) {
        let Some(mut session) = self.live_session(room_id).await else {
            return;
        };
        if session.engine.current_round().map(|round| round.id()) != Some(round_id) {
            return;
        }
        // Detach rather than abort: this is the timer task itself.
        session.round_timer.take();

        info!("⏰ Round {} of game {} timed out", round_id, room_id);
        match session.engine.end_round() {
            Ok(advance) => self.conclude_round(room_id, &mut session, advance).await,
            Err(e) => error!("Failed to end expired round {}: {}", round_id, e),
        }
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    fn encode(message: &ServerMessage, player_id: Option<&PlayerId>) -> Option<Arc<str>> {
        match encode_message(message, player_id) {
            Ok(frame) => Some(frame.into()),
            Err(e) => {
                error!("Failed to encode outbound message: {}", e);
                None
            }
        }
    }

    /// Broadcasts to the room's local members and publishes to the relay.
    async fn announce(&self, room_id: RoomId, message: &ServerMessage, actor: Option<&PlayerId>) {
        let Some(frame) = Self::encode(message, actor) else {
            return;
        };
        self.hub.broadcast(room_id, frame.clone()).await;

        let envelope = RelayEnvelope {
            origin: self.origin,
            room_id,
            frame: frame.to_string(),
        };
        if let Err(e) = self.relay.publish(envelope).await {
            warn!("📡 Relay publish for game {} failed: {}", room_id, e);
        }
    }

    /// Sends a message to one player's local connection.
    async fn send_to_player(&self, player_id: &PlayerId, message: &ServerMessage) {
        if let Some(frame) = Self::encode(message, Some(player_id)) {
            if let Err(e) = self.hub.send_to(player_id, frame).await {
                debug!("Direct message not delivered: {}", e);
            }
        }
    }

    async fn reply(&self, connection: &Arc<Connection>, message: &ServerMessage) {
        if let Some(frame) = Self::encode(message, Some(connection.player_id())) {
            let _ = self.hub.send_to_connection(connection, frame).await;
        }
    }

    async fn reply_error(&self, connection: &Arc<Connection>, error: &SessionError) {
        self.reply(connection, &ServerMessage::error(error.code(), error.to_string()))
            .await;
    }

    // ------------------------------------------------------------------
    // Store writes
    // ------------------------------------------------------------------

    /// Runs a store write, retrying once if the store is unavailable.
    async fn persist<F, Fut>(&self, what: &str, write: F) -> Result<(), StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        match write().await {
            Err(StoreError::Unavailable(reason)) => {
                warn!("💾 Store write '{}' failed ({}), retrying once", what, reason);
                write().await
            }
            other => other,
        }
    }

    /// Like [`persist`](Self::persist), but a final failure becomes a
    /// non-fatal warning broadcast to the room. In-memory state is kept.
    async fn persist_or_warn<F, Fut>(&self, room_id: RoomId, what: &str, write: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        if let Err(e) = self.persist(what, write).await {
            error!("💾 Store write '{}' for game {} failed: {}", what, room_id, e);
            let error = SessionError::from(e);
            let warning = ServerMessage::error(error.code(), format!("failed to save {what}: {error}"));
            self.announce(room_id, &warning, None).await;
        }
    }
}
