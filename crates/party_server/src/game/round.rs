//! Round records, votes and tallies.

use crate::types::{PlayerId, RoundId, RoundStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of gameplay: a category, a secret word and a hidden impostor.
///
/// The full record (secret and impostor included) never leaves the server
/// while the round is live; clients see [`Round::public_view`] until it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub(crate) id: RoundId,
    pub(crate) number: u32,
    pub(crate) category_key: String,
    pub(crate) category: String,
    pub(crate) word: String,
    pub(crate) impostor_id: PlayerId,
    pub(crate) status: RoundStatus,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    /// voter -> accused
    pub(crate) votes: BTreeMap<PlayerId, PlayerId>,
}

impl Round {
    pub(crate) fn begin(
        number: u32,
        category_key: String,
        category: String,
        word: String,
        impostor_id: PlayerId,
    ) -> Self {
        Self {
            id: RoundId::new(),
            number,
            category_key,
            category,
            word,
            impostor_id,
            status: RoundStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
            votes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn category_key(&self) -> &str {
        &self.category_key
    }

    /// The secret word. Callers deciding what a player may see should go
    /// through `RoundEngine::secret_for` instead.
    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn impostor_id(&self) -> &PlayerId {
        &self.impostor_id
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn votes(&self) -> &BTreeMap<PlayerId, PlayerId> {
        &self.votes
    }

    pub fn is_finished(&self) -> bool {
        self.status == RoundStatus::Finished
    }

    /// View safe to broadcast while the round is live.
    pub fn public_view(&self) -> RoundView {
        RoundView {
            id: self.id,
            number: self.number,
            category: self.category.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            word: None,
            impostor_id: None,
        }
    }

    /// View with the secret and impostor revealed, for finished rounds.
    pub fn revealed_view(&self) -> RoundView {
        RoundView {
            word: Some(self.word.clone()),
            impostor_id: Some(self.impostor_id.clone()),
            ..self.public_view()
        }
    }

    /// Counts the votes cast this round.
    ///
    /// The accused is the unique player with the most votes; a tie or an
    /// empty ballot box accuses nobody.
    pub fn tally(&self) -> VoteTally {
        let mut counts: BTreeMap<PlayerId, usize> = BTreeMap::new();
        for target in self.votes.values() {
            *counts.entry(target.clone()).or_default() += 1;
        }

        let top = counts.values().copied().max().unwrap_or(0);
        let mut leaders = counts.iter().filter(|(_, count)| **count == top && top > 0);
        let accused = match (leaders.next(), leaders.next()) {
            (Some((player, _)), None) => Some(player.clone()),
            _ => None,
        };
        let impostor_caught = accused.as_ref() == Some(&self.impostor_id);

        VoteTally {
            round_id: self.id,
            counts,
            accused,
            impostor_id: self.impostor_id.clone(),
            impostor_caught,
        }
    }
}

/// Client-facing projection of a [`Round`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundView {
    pub id: RoundId,
    pub number: u32,
    pub category: String,
    pub status: RoundStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impostor_id: Option<PlayerId>,
}

/// Outcome of a round's vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub round_id: RoundId,
    pub counts: BTreeMap<PlayerId, usize>,
    pub accused: Option<PlayerId>,
    pub impostor_id: PlayerId,
    pub impostor_caught: bool,
}

/// Returned by a successful vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReceipt {
    pub votes_cast: usize,
    pub votes_needed: usize,
}

impl VoteReceipt {
    /// Every current member has voted.
    pub fn is_complete(&self) -> bool {
        self.votes_cast >= self.votes_needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PlayerId {
        PlayerId::parse(s).unwrap()
    }

    fn round_with_votes(votes: &[(&str, &str)]) -> Round {
        let mut round = Round::begin(1, "animals".into(), "Animals".into(), "Lion".into(), pid("eve"));
        for (voter, target) in votes {
            round.votes.insert(pid(voter), pid(target));
        }
        round
    }

    #[test]
    fn plurality_accuses_and_catches_impostor() {
        let round = round_with_votes(&[("ann", "eve"), ("bob", "eve"), ("eve", "ann")]);
        let tally = round.tally();
        assert_eq!(tally.counts[&pid("eve")], 2);
        assert_eq!(tally.accused, Some(pid("eve")));
        assert!(tally.impostor_caught);
    }

    #[test]
    fn ties_accuse_nobody() {
        let round = round_with_votes(&[("ann", "bob"), ("bob", "ann")]);
        let tally = round.tally();
        assert_eq!(tally.accused, None);
        assert!(!tally.impostor_caught);

        let empty = round_with_votes(&[]);
        assert_eq!(empty.tally().accused, None);
    }

    #[test]
    fn public_view_hides_secret_and_impostor() {
        let round = round_with_votes(&[]);
        let public = serde_json::to_value(round.public_view()).unwrap();
        assert!(public.get("word").is_none());
        assert!(public.get("impostor_id").is_none());

        let revealed = serde_json::to_value(round.revealed_view()).unwrap();
        assert_eq!(revealed["word"], "Lion");
        assert_eq!(revealed["impostor_id"], "eve");
    }
}
