//! Intent handlers.
//!
//! Each handler validates, performs one engine and/or hub transition while
//! holding the room lock, broadcasts the outcome and returns the reply for the
//! originating connection. An `Err` means nothing was broadcast.

use super::{SessionCoordinator, SessionGuard};
use crate::connection::Connection;
use crate::error::SessionError;
use crate::game::{Round, RoundAdvance};
use crate::messaging::{
    GameEnded, GameStarted, GameState, MembershipChange, PlayerStanding, PlayerWord, RoundEnded,
    RoundStarted, ServerMessage, VoteRecorded, VoteResults,
};
use crate::types::{PlayerId, Role, RoomId, RoomStatus, RoundId};
use std::sync::Arc;
use tracing::{info, warn};

impl SessionCoordinator {
    /// `join_game`: adds the player to a waiting room.
    ///
    /// The previous room, if any, is only left once the new seat is taken.
    pub(super) async fn join_game(
        &self,
        connection: &Arc<Connection>,
        room_id: RoomId,
    ) -> Result<ServerMessage, SessionError> {
        let player = connection.player_id().clone();
        let record = self.store.get_game(room_id).await?;

        if connection.room() == Some(room_id) && self.hub.is_member(room_id, &player).await {
            return Ok(ServerMessage::success("Already in game"));
        }
        if record.status != RoomStatus::Waiting {
            return Err(not_joinable(room_id, record.status));
        }
        let previous = connection.room().filter(|previous| *previous != room_id);

        let mut session = self.open_session(&record).await?;
        if let Err(e) = self.hub.check_join(room_id, connection).await {
            self.reap_if_empty(room_id, &mut session).await;
            return Err(e.into());
        }
        if let Err(e) = self
            .persist("membership", || self.store.add_member(room_id, &player))
            .await
        {
            self.reap_if_empty(room_id, &mut session).await;
            return Err(e.into());
        }

        let count = match self.hub.join(room_id, connection).await {
            Ok(count) => count,
            Err(e) => {
                if let Err(undo) = self
                    .persist("membership", || self.store.remove_member(room_id, &player))
                    .await
                {
                    warn!("Could not undo membership of {} in game {}: {}", player, room_id, undo);
                }
                self.reap_if_empty(room_id, &mut session).await;
                return Err(e.into());
            }
        };

        session.engine.admit(player.clone());
        let joined = ServerMessage::PlayerJoined(MembershipChange {
            game_id: room_id,
            player_id: player.clone(),
            player_count: count,
        });
        self.announce(room_id, &joined, Some(&player)).await;
        info!("👋 Player {} joined game {} ({} player(s))", player, room_id, count);
        drop(session);

        // The hub already moved the connection; this settles the old room's roster.
        if let Some(previous) = previous {
            if let Err(e) = self.depart(connection, previous).await {
                warn!("Departure of {} from game {} failed: {}", player, previous, e);
            }
        }
        Ok(ServerMessage::success("Joined game successfully"))
    }

    /// `leave_game`: removes the player from the room.
    pub(super) async fn leave_game(
        &self,
        connection: &Arc<Connection>,
        room_id: RoomId,
    ) -> Result<ServerMessage, SessionError> {
        if self.depart(connection, room_id).await? {
            Ok(ServerMessage::success("Left game successfully"))
        } else {
            Err(SessionError::NotInRoom)
        }
    }

    /// Removes a connection's player from a room and tells the others.
    ///
    /// Shared by `leave_game`, switching rooms and disconnects. Returns
    /// `false` if the connection was not a member.
    pub(super) async fn depart(&self, connection: &Arc<Connection>, room_id: RoomId) -> Result<bool, SessionError> {
        let player = connection.player_id().clone();
        let Some(mut session) = self.live_session(room_id).await else {
            return Ok(self.hub.leave(room_id, connection).await);
        };
        // An evicted connection is already gone from the hub but still on the roster.
        let in_hub = self.hub.leave(room_id, connection).await;
        if !in_hub && !session.engine.is_member(&player) {
            return Ok(false);
        }

        session.engine.dismiss(&player);
        self.persist_or_warn(room_id, "membership", || self.store.remove_member(room_id, &player))
            .await;

        let remaining = self.hub.member_count(room_id).await;
        let left = ServerMessage::PlayerLeft(MembershipChange {
            game_id: room_id,
            player_id: player.clone(),
            player_count: remaining,
        });
        self.announce(room_id, &left, Some(&player)).await;
        info!("👋 Player {} left game {} ({} remaining)", player, room_id, remaining);

        if remaining == 0 {
            // Evicted connections whose teardown has not run yet.
            for stranded in session.engine.members().to_vec() {
                session.engine.dismiss(&stranded);
                self.persist_or_warn(room_id, "membership", || self.store.remove_member(room_id, &stranded))
                    .await;
            }
            if session.engine.status() == RoomStatus::Active {
                self.persist_or_warn(room_id, "game status", || {
                    self.store.update_status(room_id, RoomStatus::Finished)
                })
                .await;
            }
            self.reap(room_id, &mut session).await;
        } else if self.all_votes_in(&session) {
            match session.engine.end_round() {
                Ok(advance) => self.conclude_round(room_id, &mut session, advance).await,
                Err(e) => warn!("Could not close round after departure: {}", e),
            }
        }
        Ok(true)
    }

    /// `start_game`: plays round 1 if enough players are present.
    pub(super) async fn start_game(
        &self,
        connection: &Arc<Connection>,
        room_id: RoomId,
    ) -> Result<ServerMessage, SessionError> {
        let mut session = self.member_session(connection, room_id).await?;
        // Another instance sharing the room may have started it already.
        let record = self.store.get_game(room_id).await?;
        if record.status != RoomStatus::Waiting {
            return Err(not_joinable(room_id, record.status));
        }
        let members = self.hub.members(room_id).await;

        let first = session.engine.start(&members)?.clone();
        self.mark_status(room_id, RoomStatus::Active).await;
        self.persist_or_warn(room_id, "game status", || {
            self.store.update_status(room_id, RoomStatus::Active)
        })
        .await;

        let started = ServerMessage::GameStarted(GameStarted {
            game_id: room_id,
            players: session.engine.members().to_vec(),
            rounds: session.engine.rules().settings.rounds,
        });
        self.announce(room_id, &started, Some(connection.player_id())).await;
        info!("🎮 Game {} started with {} player(s)", room_id, members.len());

        self.open_round(room_id, &mut session, first).await;
        Ok(ServerMessage::success("Game started successfully"))
    }

    /// `end_game`: ends the current round, or the whole game with `finish`.
    pub(super) async fn end_game(
        &self,
        connection: &Arc<Connection>,
        room_id: RoomId,
        finish: bool,
    ) -> Result<ServerMessage, SessionError> {
        let mut session = self.member_session(connection, room_id).await?;
        let advance = if finish {
            session.engine.finish()?
        } else {
            session.engine.end_round()?
        };
        let terminal = advance.is_terminal();
        self.conclude_round(room_id, &mut session, advance).await;

        Ok(ServerMessage::success(if terminal {
            "Game ended successfully"
        } else {
            "Round ended successfully"
        }))
    }

    /// `vote`: records a vote; the round closes once every member has voted.
    pub(super) async fn vote(
        &self,
        connection: &Arc<Connection>,
        room_id: RoomId,
        round_id: RoundId,
        target: &PlayerId,
    ) -> Result<ServerMessage, SessionError> {
        let voter = connection.player_id().clone();
        let mut session = self
            .live_session(room_id)
            .await
            .ok_or_else(|| SessionError::NotFound(format!("game {} has no active round", room_id)))?;

        let receipt = session.engine.record_vote(round_id, &voter, target)?;
        let recorded = ServerMessage::VoteRecorded(VoteRecorded {
            game_id: room_id,
            round_id,
            voter_id: voter.clone(),
            voted_for_id: target.clone(),
            votes_cast: receipt.votes_cast,
            votes_needed: receipt.votes_needed,
        });
        self.announce(room_id, &recorded, Some(&voter)).await;

        if receipt.is_complete() {
            let advance = session.engine.end_round()?;
            self.conclude_round(room_id, &mut session, advance).await;
        }
        Ok(ServerMessage::success("Vote recorded"))
    }

    /// `get_game_state`: the live view if the room is open here, else the stored record.
    pub(super) async fn game_state(&self, room_id: RoomId) -> Result<ServerMessage, SessionError> {
        let record = self.store.get_game(room_id).await?;

        let state = match self.live_session(room_id).await {
            Some(session) => {
                let engine = &session.engine;
                GameState {
                    status: engine.status(),
                    players: engine
                        .members()
                        .iter()
                        .map(|player_id| PlayerStanding {
                            player_id: player_id.clone(),
                            score: engine.scores().get(player_id).copied().unwrap_or(0),
                        })
                        .collect(),
                    current_round: engine.current_round().map(Round::public_view),
                    rounds: engine
                        .rounds()
                        .iter()
                        .filter(|round| round.is_finished())
                        .map(Round::revealed_view)
                        .collect(),
                    game: record,
                }
            }
            None => {
                let rounds = self.store.rounds(room_id).await.unwrap_or_default();
                GameState {
                    status: record.status,
                    players: record
                        .players
                        .iter()
                        .map(|player_id| PlayerStanding {
                            player_id: player_id.clone(),
                            score: 0,
                        })
                        .collect(),
                    current_round: None,
                    rounds: rounds
                        .iter()
                        .filter(|round| round.is_finished())
                        .map(Round::revealed_view)
                        .collect(),
                    game: record,
                }
            }
        };
        Ok(ServerMessage::GameState(Box::new(state)))
    }

    /// `get_player_word`: the caller's role and, unless impostor, the secret.
    pub(super) async fn player_word(
        &self,
        player_id: &PlayerId,
        room_id: RoomId,
    ) -> Result<ServerMessage, SessionError> {
        if let Some(session) = self.live_session(room_id).await {
            if session.engine.current_round().is_some() {
                return Self::word_for(&session, room_id, player_id).map(ServerMessage::PlayerWord);
            }
        }
        self.stored_word(room_id, player_id).await.map(ServerMessage::PlayerWord)
    }

    /// Answers from the store when the round is being played on another instance.
    async fn stored_word(&self, room_id: RoomId, player_id: &PlayerId) -> Result<PlayerWord, SessionError> {
        let record = self.store.get_game(room_id).await?;
        if !record.players.contains(player_id) {
            return Err(SessionError::NotInRoom);
        }
        let rounds = self.store.rounds(room_id).await?;
        let round = rounds
            .iter()
            .rev()
            .find(|round| !round.is_finished())
            .ok_or_else(|| SessionError::NotFound("no active round".to_string()))?;
        let impostor = round.impostor_id() == player_id;
        Ok(PlayerWord {
            game_id: room_id,
            round_id: round.id(),
            round_number: round.number(),
            category: round.category().to_string(),
            role: if impostor { Role::Impostor } else { Role::Player },
            word: (!impostor).then(|| round.word().to_string()),
        })
    }

    fn word_for(session: &SessionGuard, room_id: RoomId, player_id: &PlayerId) -> Result<PlayerWord, SessionError> {
        let engine = &session.engine;
        if !engine.is_member(player_id) {
            return Err(SessionError::NotInRoom);
        }
        let round = engine
            .current_round()
            .ok_or_else(|| SessionError::NotFound("no active round".to_string()))?;
        Ok(PlayerWord {
            game_id: room_id,
            round_id: round.id(),
            round_number: round.number(),
            category: round.category().to_string(),
            role: engine.role_for(player_id),
            word: engine.secret_for(player_id).map(str::to_string),
        })
    }

    /// Locks a room's session, requiring the caller to be a member.
    async fn member_session(&self, connection: &Arc<Connection>, room_id: RoomId) -> Result<SessionGuard, SessionError> {
        let session = match self.live_session(room_id).await {
            Some(session) => session,
            None => {
                self.store.get_game(room_id).await?;
                return Err(SessionError::NotInRoom);
            }
        };
        if !self.hub.is_member(room_id, connection.player_id()).await {
            return Err(SessionError::NotInRoom);
        }
        Ok(session)
    }

    /// Mirrors a room status change into the hub's join check.
    async fn mark_status(&self, room_id: RoomId, status: RoomStatus) {
        if let Err(e) = self.hub.set_status(room_id, status).await {
            warn!("Could not mark game {} as {}: {}", room_id, status, e);
        }
    }

    fn all_votes_in(&self, session: &SessionGuard) -> bool {
        let engine = &session.engine;
        if !engine.rules().settings.voting_enabled || engine.members().is_empty() {
            return false;
        }
        match engine.current_round() {
            Some(round) if !round.votes().is_empty() => engine
                .members()
                .iter()
                .all(|member| round.votes().contains_key(member)),
            _ => false,
        }
    }

    async fn reap_if_empty(&self, room_id: RoomId, session: &mut SessionGuard) {
        if self.hub.member_count(room_id).await == 0 && session.engine.members().is_empty() {
            self.reap(room_id, session).await;
        }
    }

    /// Announces a freshly started round, pushes each member their word and
    /// arms the round timer.
    async fn open_round(&self, room_id: RoomId, session: &mut SessionGuard, round: Round) {
        self.persist_or_warn(room_id, "round", || self.store.record_round(room_id, &round))
            .await;

        let started = ServerMessage::RoundStarted(RoundStarted {
            game_id: room_id,
            round: round.public_view(),
        });
        self.announce(room_id, &started, None).await;

        for member in session.engine.members().to_vec() {
            match Self::word_for(session, room_id, &member) {
                Ok(word) => self.send_to_player(&member, &ServerMessage::PlayerWord(word)).await,
                Err(e) => warn!("No word for {} in game {}: {}", member, room_id, e),
            }
        }

        self.schedule_round_timer(room_id, round.id(), session);
    }

    /// Publishes the end of a round and either opens the next one or ends the game.
    pub(super) async fn conclude_round(&self, room_id: RoomId, session: &mut SessionGuard, advance: RoundAdvance) {
        session.cancel_timer();
        let ended = advance.ended().clone();
        self.persist_or_warn(room_id, "round", || self.store.record_round(room_id, &ended))
            .await;

        if let Some(tally) = advance.tally() {
            let results = ServerMessage::VoteResults(VoteResults::new(room_id, tally.clone()));
            self.announce(room_id, &results, None).await;
        }

        let round_ended = ServerMessage::RoundEnded(RoundEnded {
            game_id: room_id,
            round: ended.revealed_view(),
            scores: session.engine.scores().clone(),
        });
        self.announce(room_id, &round_ended, None).await;

        match advance {
            RoundAdvance::Next { next, .. } => {
                self.open_round(room_id, session, next).await;
            }
            RoundAdvance::Finished { .. } => {
                self.mark_status(room_id, RoomStatus::Finished).await;
                self.persist_or_warn(room_id, "game status", || {
                    self.store.update_status(room_id, RoomStatus::Finished)
                })
                .await;

                let game_ended = ServerMessage::GameEnded(GameEnded {
                    game_id: room_id,
                    rounds_played: session.engine.rounds().len(),
                    scores: session.engine.scores().clone(),
                });
                self.announce(room_id, &game_ended, None).await;
                info!("🏁 Game {} finished after {} round(s)", room_id, session.engine.rounds().len());
                self.reap(room_id, session).await;
            }
        }
    }
}

fn not_joinable(room_id: RoomId, status: RoomStatus) -> SessionError {
    SessionError::NotJoinable(format!(
        "game {} is not accepting players (status: {})",
        room_id, status
    ))
}
