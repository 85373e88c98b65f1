//! Scoring and ranking
//!
//! This module keeps the points each player earned per round and turns the
//! cumulative totals into ranked standings. The same ranking function backs
//! the live per-round leaderboard and the final result, so intermediate and
//! final standings always agree on ties.

use std::{cmp::Reverse, collections::HashMap};

use itertools::Itertools;

use crate::{player::Id, presence::Presence};

/// A player's place in the standings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// Competition rank, 1-based; tied players share a rank
    pub rank: usize,
    /// The player's id
    pub id: Id,
    /// The player's display name
    pub nickname: String,
    /// Cumulative number of correct answers
    pub score: u64,
}

/// Ranks every registered player by score using competition ranking
///
/// Players are ordered by score descending, then nickname ascending (and
/// id as a last resort) for a deterministic display order. A run of tied
/// scores shares the 1-based position of its first member and the next
/// distinct score takes its own position, so ranks can skip: 1, 1, 3, 4.
/// Players without an entry in `scores` are ranked with 0 points.
pub fn rank(scores: &HashMap<Id, u64>, presence: &Presence) -> Vec<Standing> {
    let mut standings = presence
        .iter()
        .map(|(id, nickname)| Standing {
            rank: 0,
            id: id.clone(),
            nickname: nickname.to_owned(),
            score: scores.get(id).copied().unwrap_or_default(),
        })
        .sorted_by(|a, b| {
            (Reverse(a.score), &a.nickname, &a.id).cmp(&(Reverse(b.score), &b.nickname, &b.id))
        })
        .collect_vec();

    let mut previous: Option<(u64, usize)> = None;
    for (position, standing) in standings.iter_mut().enumerate() {
        standing.rank = match previous {
            Some((score, rank)) if score == standing.score => rank,
            _ => position + 1,
        };
        previous = Some((standing.score, standing.rank));
    }

    standings
}

/// Cumulative scores of a session
///
/// Points are recorded per round so that a player's round-by-round history
/// can be reported in their personal score at the end of the session.
#[derive(Debug, Default, Clone)]
pub struct Leaderboard {
    /// Points earned by each answering player for each round
    points_earned: Vec<Vec<(Id, u64)>>,

    /// Total points per player (cached)
    totals: HashMap<Id, u64>,
}

impl Leaderboard {
    /// Records the points earned in a round and updates totals
    ///
    /// # Arguments
    ///
    /// * `scores` - (player, points) for every player that answered the round
    pub fn add_scores(&mut self, scores: &[(Id, u64)]) {
        for (id, points) in scores {
            *self.totals.entry(id.clone()).or_default() += points;
        }
        self.points_earned.push(scores.to_vec());
    }

    /// Returns a player's cumulative score, 0 if they never scored
    pub fn total(&self, id: &Id) -> u64 {
        self.totals.get(id).copied().unwrap_or_default()
    }

    /// Returns the number of rounds scored so far
    pub fn rounds_played(&self) -> usize {
        self.points_earned.len()
    }

    /// Ranks every registered player by cumulative score
    pub fn standings(&self, presence: &Presence) -> Vec<Standing> {
        rank(&self.totals, presence)
    }

    /// Returns the points a player earned in each round, 0 where they did not answer
    pub fn player_summary(&self, id: &Id) -> Vec<u64> {
        self.points_earned
            .iter()
            .map(|round| {
                round
                    .iter()
                    .find(|(player, _)| player == id)
                    .map_or(0, |(_, points)| *points)
            })
            .collect_vec()
    }
}
