//! Round engine: the per-room game state machine.
//!
//! ```text
//! waiting --start--> active(round 1) --end_round--> active(round N+1)
//!                                   \--vote------> voting --end_round--> active(round N+1) | finished
//! ```
//!
//! The engine performs pure state transitions. It does no I/O and holds no
//! locks; the session coordinator wraps each instance in a per-room mutex so
//! that at most one transition is in flight per room.

use super::catalog::Catalog;
use super::round::{Round, VoteReceipt, VoteTally};
use super::settings::GameSettings;
use crate::types::{PlayerId, Role, RoomId, RoomStatus, RoundId, RoundStatus};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Rejections produced by the round engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("not enough players to start game ({have} of {need})")]
    InsufficientPlayers { have: usize, need: usize },
    #[error("game has already started")]
    AlreadyStarted,
    #[error("no active round")]
    NoActiveRound,
    #[error("round {0} is not the current round")]
    StaleRound(RoundId),
    #[error("player {0} already voted this round")]
    DuplicateVote(PlayerId),
    #[error("unknown vote target {0}")]
    UnknownTarget(PlayerId),
    #[error("player {0} is not part of this game")]
    NotAMember(PlayerId),
    #[error("voting is disabled for this game")]
    VotingDisabled,
    #[error("no categories available")]
    EmptyCatalog,
}

/// Fixed rules of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    pub min_players: usize,
    pub max_players: usize,
    pub settings: GameSettings,
}

/// What happened when a round ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundAdvance {
    /// The next round started.
    Next {
        ended: Round,
        tally: Option<VoteTally>,
        next: Round,
    },
    /// The game is over.
    Finished {
        ended: Round,
        tally: Option<VoteTally>,
    },
}

impl RoundAdvance {
    pub fn ended(&self) -> &Round {
        match self {
            RoundAdvance::Next { ended, .. } | RoundAdvance::Finished { ended, .. } => ended,
        }
    }

    pub fn tally(&self) -> Option<&VoteTally> {
        match self {
            RoundAdvance::Next { tally, .. } | RoundAdvance::Finished { tally, .. } => tally.as_ref(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundAdvance::Finished { .. })
    }
}

/// Per-room round lifecycle.
pub struct RoundEngine {
    room_id: RoomId,
    rules: GameRules,
    catalog: Arc<Catalog>,
    status: RoomStatus,
    /// Current roster in join order
    members: Vec<PlayerId>,
    /// Every round played so far; the last one is current while unfinished
    rounds: Vec<Round>,
    scores: BTreeMap<PlayerId, u32>,
    rng: StdRng,
}

impl std::fmt::Debug for RoundEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundEngine")
            .field("room_id", &self.room_id)
            .field("status", &self.status)
            .field("members", &self.members)
            .field("rounds", &self.rounds.len())
            .finish()
    }
}

impl RoundEngine {
    /// Creates an engine in the `waiting` state, seeded from OS entropy.
    pub fn new(room_id: RoomId, rules: GameRules, catalog: Arc<Catalog>) -> Self {
        Self::with_rng(room_id, rules, catalog, StdRng::from_os_rng())
    }

    /// Creates an engine drawing from the given generator.
    pub fn with_rng(room_id: RoomId, rules: GameRules, catalog: Arc<Catalog>, rng: StdRng) -> Self {
        Self {
            room_id,
            rules,
            catalog,
            status: RoomStatus::Waiting,
            members: Vec::new(),
            rounds: Vec::new(),
            scores: BTreeMap::new(),
            rng,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn is_member(&self, player_id: &PlayerId) -> bool {
        self.members.contains(player_id)
    }

    pub fn scores(&self) -> &BTreeMap<PlayerId, u32> {
        &self.scores
    }

    /// All rounds played, oldest first.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// The round currently in play, if any.
    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.last().filter(|round| !round.is_finished())
    }

    fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.rounds.last_mut().filter(|round| !round.is_finished())
    }

    /// Adds a player to the roster. Idempotent.
    pub fn admit(&mut self, player_id: PlayerId) {
        if !self.members.contains(&player_id) {
            self.scores.entry(player_id.clone()).or_insert(0);
            self.members.push(player_id);
        }
    }

    /// Removes a player from the roster. Idempotent.
    ///
    /// Votes already cast stay on the round; the departed player simply stops
    /// counting toward the votes needed.
    pub fn dismiss(&mut self, player_id: &PlayerId) {
        self.members.retain(|member| member != player_id);
    }

    /// Starts the game with the given members and plays round 1.
    ///
    /// # Errors
    ///
    /// * [`EngineError::AlreadyStarted`] unless the room is waiting
    /// * [`EngineError::InsufficientPlayers`] when `members` is below the minimum
    pub fn start(&mut self, members: &[PlayerId]) -> Result<&Round, EngineError> {
        if self.status != RoomStatus::Waiting {
            return Err(EngineError::AlreadyStarted);
        }
        if members.len() < self.rules.min_players {
            return Err(EngineError::InsufficientPlayers {
                have: members.len(),
                need: self.rules.min_players,
            });
        }

        let mut roster: Vec<PlayerId> = Vec::with_capacity(members.len());
        for member in members {
            if !roster.contains(member) {
                roster.push(member.clone());
            }
        }
        let round = self.draw_round(1, &roster)?;

        for member in &roster {
            self.scores.entry(member.clone()).or_insert(0);
        }
        self.members = roster;
        self.status = RoomStatus::Active;
        self.rounds.push(round);
        Ok(&self.rounds[self.rounds.len() - 1])
    }

    /// Picks category, secret and impostor for a new round.
    fn draw_round(&mut self, number: u32, roster: &[PlayerId]) -> Result<Round, EngineError> {
        if roster.is_empty() {
            return Err(EngineError::InsufficientPlayers { have: 0, need: self.rules.min_players.max(1) });
        }
        let eligible = self.catalog.eligible(&self.rules.settings.categories);
        if eligible.is_empty() {
            return Err(EngineError::EmptyCatalog);
        }

        let category = eligible[self.rng.random_range(0..eligible.len())];
        if category.words.is_empty() {
            return Err(EngineError::EmptyCatalog);
        }
        let word = category.words[self.rng.random_range(0..category.words.len())].clone();
        let impostor = roster[self.rng.random_range(0..roster.len())].clone();

        Ok(Round::begin(number, category.key.clone(), category.name.clone(), word, impostor))
    }

    /// `Impostor` iff the player is the current round's impostor.
    pub fn role_for(&self, player_id: &PlayerId) -> Role {
        match self.current_round() {
            Some(round) if round.impostor_id == *player_id => Role::Impostor,
            _ => Role::Player,
        }
    }

    /// The current secret as seen by `player_id`.
    ///
    /// Returns `None` for the impostor, for anyone outside the roster and when
    /// no round is in play.
    pub fn secret_for(&self, player_id: &PlayerId) -> Option<&str> {
        let round = self.current_round()?;
        if round.impostor_id == *player_id || !self.is_member(player_id) {
            return None;
        }
        Some(&round.word)
    }

    /// Records `voter`'s vote against `target` in the current round.
    ///
    /// A second vote by the same voter is rejected and leaves state untouched.
    pub fn record_vote(
        &mut self,
        round_id: RoundId,
        voter: &PlayerId,
        target: &PlayerId,
    ) -> Result<VoteReceipt, EngineError> {
        let voting_enabled = self.rules.settings.voting_enabled;
        let voter_known = self.members.contains(voter);
        let target_known = self.members.contains(target);
        let votes_needed = self.members.len();

        let round = self
            .rounds
            .last_mut()
            .filter(|round| !round.is_finished())
            .ok_or(EngineError::NoActiveRound)?;
        if round.id != round_id {
            return Err(EngineError::StaleRound(round_id));
        }
        if !voting_enabled {
            return Err(EngineError::VotingDisabled);
        }
        if !voter_known {
            return Err(EngineError::NotAMember(voter.clone()));
        }
        if round.votes.contains_key(voter) {
            return Err(EngineError::DuplicateVote(voter.clone()));
        }
        if !target_known {
            return Err(EngineError::UnknownTarget(target.clone()));
        }

        round.votes.insert(voter.clone(), target.clone());
        round.status = RoundStatus::Voting;

        let members = &self.members;
        let votes_cast = round.votes.keys().filter(|v| members.contains(v)).count();
        Ok(VoteReceipt { votes_cast, votes_needed })
    }

    /// Ends the current round and either starts the next one or finishes the game.
    ///
    /// The game finishes when the configured round count has been played, or
    /// when fewer than `min_players` members remain to play another round.
    /// A next round that cannot be drawn also finishes the game.
    pub fn end_round(&mut self) -> Result<RoundAdvance, EngineError> {
        let (ended, tally) = self.close_current_round()?;

        let played = self.rounds.len();
        if played < self.rules.settings.rounds as usize && self.members.len() >= self.rules.min_players {
            let roster = self.members.clone();
            if let Ok(next) = self.draw_round(played as u32 + 1, &roster) {
                self.rounds.push(next.clone());
                return Ok(RoundAdvance::Next { ended, tally, next });
            }
        }

        self.status = RoomStatus::Finished;
        Ok(RoundAdvance::Finished { ended, tally })
    }

    /// Ends the current round and finishes the game regardless of round count.
    pub fn finish(&mut self) -> Result<RoundAdvance, EngineError> {
        let (ended, tally) = self.close_current_round()?;
        self.status = RoomStatus::Finished;
        Ok(RoundAdvance::Finished { ended, tally })
    }

    fn close_current_round(&mut self) -> Result<(Round, Option<VoteTally>), EngineError> {
        let voting_enabled = self.rules.settings.voting_enabled;
        let round = self.current_round_mut().ok_or(EngineError::NoActiveRound)?;
        round.status = RoundStatus::Finished;
        round.ended_at = Some(Utc::now());
        let ended = round.clone();

        let tally = voting_enabled.then(|| ended.tally());
        if let Some(tally) = &tally {
            self.award(&ended, tally);
        }
        Ok((ended, tally))
    }

    /// Voters who named the impostor earn a point; an uncaught impostor earns one.
    fn award(&mut self, round: &Round, tally: &VoteTally) {
        for (voter, target) in &round.votes {
            if *target == round.impostor_id {
                *self.scores.entry(voter.clone()).or_insert(0) += 1;
            }
        }
        if !tally.impostor_caught {
            *self.scores.entry(round.impostor_id.clone()).or_insert(0) += 1;
        }
    }
}
