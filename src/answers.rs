//! Answer collection for the open round
//!
//! A [`Round`] buffers the answers received while its question is open and
//! enforces the one-answer-per-player rule. Rejections are typed so the
//! orchestrator can log them, but none of them is an error the sender sees:
//! the bus may redeliver or reorder messages, so stale, late and duplicate
//! answers are expected traffic.

use std::collections::HashMap;

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{constants::wire::NO_ANSWER, player::Id, presence::Presence, question::IndexedQuestion};

/// The option a player picked, or the "no answer" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Choice {
    /// The player picked the option at this index
    Option(usize),
    /// The player's countdown expired without a pick
    NoAnswer,
}

/// Error produced when a wire value is neither an option index nor the sentinel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("answer index {0} is neither an option nor the no-answer sentinel")]
pub struct InvalidChoice(pub i64);

impl TryFrom<i64> for Choice {
    type Error = InvalidChoice;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == NO_ANSWER {
            return Ok(Self::NoAnswer);
        }
        usize::try_from(value)
            .map(Self::Option)
            .map_err(|_| InvalidChoice(value))
    }
}

impl From<Choice> for i64 {
    fn from(choice: Choice) -> Self {
        match choice {
            Choice::Option(index) => i64::try_from(index).unwrap_or(i64::MAX),
            Choice::NoAnswer => NO_ANSWER,
        }
    }
}

/// How an accepted answer was judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Outcome {
    /// The chosen option was the correct one
    Correct,
    /// The chosen option was wrong (or out of range)
    Incorrect,
    /// The player did not answer in time
    TimedOut,
}

/// Reasons an answer was not accepted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The round no longer accepts answers
    #[error("round is closed")]
    Closed,
    /// The answer is tagged with another round
    #[error("answer for round {received} while round {expected} is open")]
    StaleRound {
        /// Index of the open round
        expected: usize,
        /// Index the answer was tagged with
        received: usize,
    },
    /// The sender never announced its presence
    #[error("unknown player {0}")]
    UnknownPlayer(Id),
    /// The player already has an accepted answer for this round
    #[error("player {0} already answered")]
    Duplicate(Id),
}

/// One question's collection window
#[derive(Debug, Clone)]
pub struct Round {
    question: IndexedQuestion,
    open: bool,
    /// Accepted choices, keyed by player
    choices: HashMap<Id, Choice>,
    /// Players in the order their answer was accepted
    arrival: Vec<Id>,
}

impl Round {
    /// Opens a round for a drawn question
    pub fn open(question: IndexedQuestion) -> Self {
        Self {
            question,
            open: true,
            choices: HashMap::new(),
            arrival: Vec::new(),
        }
    }

    /// Returns the session-relative index of this round
    pub fn index(&self) -> usize {
        self.question.index
    }

    /// Returns the question this round wraps
    pub fn question(&self) -> &IndexedQuestion {
        &self.question
    }

    /// Checks whether the round still accepts answers
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Closes the round; every later submission is rejected
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Offers an answer to the round
    ///
    /// # Errors
    ///
    /// * [`Rejection::Closed`] - the round's deadline already passed
    /// * [`Rejection::StaleRound`] - the answer belongs to another round
    /// * [`Rejection::UnknownPlayer`] - the sender is not registered
    /// * [`Rejection::Duplicate`] - the sender already has an accepted answer;
    ///   the stored choice is left unchanged
    pub fn submit(
        &mut self,
        round_index: usize,
        player: &Id,
        choice: Choice,
        presence: &Presence,
    ) -> Result<(), Rejection> {
        if !self.open {
            return Err(Rejection::Closed);
        }
        if round_index != self.index() {
            return Err(Rejection::StaleRound {
                expected: self.index(),
                received: round_index,
            });
        }
        if !presence.contains(player) {
            return Err(Rejection::UnknownPlayer(player.clone()));
        }
        if self.choices.contains_key(player) {
            return Err(Rejection::Duplicate(player.clone()));
        }

        self.choices.insert(player.clone(), choice);
        self.arrival.push(player.clone());
        Ok(())
    }

    /// Returns the accepted choice of a player, if any
    pub fn choice_of(&self, player: &Id) -> Option<Choice> {
        self.choices.get(player).copied()
    }

    /// Returns the number of accepted answers
    pub fn answer_count(&self) -> usize {
        self.arrival.len()
    }

    /// Judges a choice against this round's correct option
    pub fn judge(&self, choice: Choice) -> Outcome {
        match choice {
            Choice::NoAnswer => Outcome::TimedOut,
            Choice::Option(index) if index == self.question.question.correct => Outcome::Correct,
            Choice::Option(_) => Outcome::Incorrect,
        }
    }

    /// Iterates over accepted answers in arrival order, with their outcome
    pub fn judged(&self) -> impl Iterator<Item = (&Id, Choice, Outcome)> {
        self.arrival.iter().filter_map(|id| {
            let choice = *self.choices.get(id)?;
            Some((id, choice, self.judge(choice)))
        })
    }

    /// Counts accepted answers by outcome
    pub fn stats(&self) -> EnumMap<Outcome, usize> {
        let mut stats = EnumMap::default();
        for (_, _, outcome) in self.judged() {
            stats[outcome] += 1;
        }
        stats
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::question::Question;

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    fn presence_with(ids: &[&str]) -> Presence {
        let mut presence = Presence::default();
        for player in ids {
            presence.register(id(player), player).unwrap();
        }
        presence
    }

    fn round(index: usize) -> Round {
        Round::open(IndexedQuestion {
            index,
            question: Question::new("Pick C", ["A", "B", "C"], 2),
            time_limit: Duration::from_secs(10),
        })
    }

    #[test]
    fn test_duplicate_submission_keeps_first_choice() {
        let presence = presence_with(&["alice"]);
        let mut round = round(0);

        assert_eq!(round.submit(0, &id("alice"), Choice::Option(2), &presence), Ok(()));
        assert_eq!(
            round.submit(0, &id("alice"), Choice::Option(2), &presence),
            Err(Rejection::Duplicate(id("alice")))
        );
        assert_eq!(
            round.submit(0, &id("alice"), Choice::Option(0), &presence),
            Err(Rejection::Duplicate(id("alice")))
        );

        assert_eq!(round.answer_count(), 1);
        assert_eq!(round.choice_of(&id("alice")), Some(Choice::Option(2)));
    }

    #[test]
    fn test_stale_round_is_dropped() {
        let presence = presence_with(&["alice"]);
        let mut round = round(3);

        assert_eq!(
            round.submit(2, &id("alice"), Choice::Option(1), &presence),
            Err(Rejection::StaleRound {
                expected: 3,
                received: 2
            })
        );
        assert_eq!(
            round.submit(4, &id("alice"), Choice::Option(1), &presence),
            Err(Rejection::StaleRound {
                expected: 3,
                received: 4
            })
        );
        assert_eq!(round.answer_count(), 0);
    }

    #[test]
    fn test_unknown_player_is_dropped() {
        let presence = presence_with(&["alice"]);
        let mut round = round(0);

        assert_eq!(
            round.submit(0, &id("mallory"), Choice::Option(2), &presence),
            Err(Rejection::UnknownPlayer(id("mallory")))
        );
        assert_eq!(round.answer_count(), 0);
    }

    #[test]
    fn test_closed_round_rejects_late_answers() {
        let presence = presence_with(&["alice"]);
        let mut round = round(0);
        round.close();

        assert!(!round.is_open());
        assert_eq!(
            round.submit(0, &id("alice"), Choice::Option(2), &presence),
            Err(Rejection::Closed)
        );
        assert_eq!(round.choice_of(&id("alice")), None);
    }

    #[test]
    fn test_sentinel_is_recorded_and_judged_timed_out() {
        let presence = presence_with(&["alice", "bob", "carol"]);
        let mut round = round(0);

        round.submit(0, &id("alice"), Choice::NoAnswer, &presence).unwrap();
        round.submit(0, &id("bob"), Choice::Option(2), &presence).unwrap();
        round.submit(0, &id("carol"), Choice::Option(7), &presence).unwrap();

        let judged: Vec<_> = round.judged().map(|(id, _, o)| (id.clone(), o)).collect();
        assert_eq!(
            judged,
            vec![
                (id("alice"), Outcome::TimedOut),
                (id("bob"), Outcome::Correct),
                (id("carol"), Outcome::Incorrect),
            ]
        );

        let stats = round.stats();
        assert_eq!(stats[Outcome::Correct], 1);
        assert_eq!(stats[Outcome::Incorrect], 1);
        assert_eq!(stats[Outcome::TimedOut], 1);
    }

    #[test]
    fn test_choice_wire_values() {
        assert_eq!(Choice::try_from(-1), Ok(Choice::NoAnswer));
        assert_eq!(Choice::try_from(3), Ok(Choice::Option(3)));
        assert_eq!(Choice::try_from(-2), Err(InvalidChoice(-2)));

        assert_eq!(i64::from(Choice::NoAnswer), -1);
        assert_eq!(serde_json::to_string(&Choice::Option(2)).unwrap(), "2");
        assert!(serde_json::from_str::<Choice>("-5").is_err());
    }
}
