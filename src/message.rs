//! Wire protocol
//!
//! Every topic carries exactly one JSON payload shape. Payloads are decoded
//! once, at the transport boundary, into the closed message enums below; a
//! payload that does not match its topic's shape is a [`DecodeError`] and
//! never reaches the state machines.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{answers::Choice, leaderboard::Standing, player::Id, question::IndexedQuestion};

/// A bus topic, relative to the session's topic prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum Topic {
    /// Player announcements, player → orchestrator
    #[display("presence")]
    Presence,
    /// Question broadcasts, orchestrator → all players
    #[display("question")]
    Question,
    /// Answers, player → orchestrator
    #[display("answer")]
    Answer,
    /// Per-round verdict, orchestrator → one player
    #[display("feedback/{_0}")]
    Feedback(Id),
    /// Live standings, orchestrator → all
    #[display("leaderboard")]
    Leaderboard,
    /// Final standings, orchestrator → all
    #[display("final-result")]
    FinalResult,
    /// Personal final score, orchestrator → one player
    #[display("score/{_0}")]
    Score(Id),
}

impl Topic {
    /// Returns the full topic name under `prefix`
    pub fn path(&self, prefix: &str) -> String {
        format!("{prefix}/{self}")
    }

    /// Parses a full topic name published under `prefix`
    ///
    /// # Returns
    ///
    /// `None` if the name is outside the prefix or names no known topic
    pub fn parse(prefix: &str, path: &str) -> Option<Self> {
        let relative = path.strip_prefix(prefix)?.strip_prefix('/')?;
        match relative.split_once('/') {
            None => match relative {
                "presence" => Some(Self::Presence),
                "question" => Some(Self::Question),
                "answer" => Some(Self::Answer),
                "leaderboard" => Some(Self::Leaderboard),
                "final-result" => Some(Self::FinalResult),
                _ => None,
            },
            Some(("feedback", id)) => id.parse().ok().map(Self::Feedback),
            Some(("score", id)) => id.parse().ok().map(Self::Score),
            Some(_) => None,
        }
    }
}

/// `presence` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMessage {
    /// The announcing player's id
    pub id: Id,
    /// The player's chosen nickname, possibly empty
    #[serde(default)]
    pub nickname: String,
}

/// `question` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionMessage {
    /// Round index within the session
    pub id: usize,
    /// Prompt text
    pub question: String,
    /// Answer options in display order
    pub options: Vec<String>,
    /// Countdown length in seconds
    pub timer: u64,
}

impl From<&IndexedQuestion> for QuestionMessage {
    fn from(drawn: &IndexedQuestion) -> Self {
        Self {
            id: drawn.index,
            question: drawn.question.prompt.clone(),
            options: drawn.question.options.clone(),
            timer: drawn.time_limit.as_secs(),
        }
    }
}

/// `answer` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMessage {
    /// Round index the answer is for
    pub question_id: usize,
    /// Chosen option, `-1` for no answer
    pub answer_index: Choice,
    /// The answering player's id
    pub client_id: Id,
}

/// `feedback/{id}` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    /// Round index the verdict belongs to
    ///
    /// Feedback without it is applied to whatever round the player is in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<usize>,
    /// Whether the recorded answer was correct
    pub correct: bool,
    /// The recorded answer, `-1` if the player did not answer in time
    pub answer_index: Choice,
    /// Index of the correct option
    pub correct_answer_index: usize,
}

/// One row of the `leaderboard` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Competition rank
    pub rank: usize,
    /// Display name
    pub pseudo: String,
    /// Cumulative correct answers
    pub score: u64,
}

impl From<&Standing> for LeaderboardEntry {
    fn from(standing: &Standing) -> Self {
        Self {
            rank: standing.rank,
            pseudo: standing.nickname.clone(),
            score: standing.score,
        }
    }
}

/// `leaderboard` payload, ordered best first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaderboardMessage(pub Vec<LeaderboardEntry>);

/// One row of the `final-result` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalEntry {
    /// The player's id
    pub client_id: Id,
    /// Display name
    pub nickname: String,
    /// Final score
    pub score: u64,
    /// Competition rank
    pub rank: usize,
}

impl From<&Standing> for FinalEntry {
    fn from(standing: &Standing) -> Self {
        Self {
            client_id: standing.id.clone(),
            nickname: standing.nickname.clone(),
            score: standing.score,
            rank: standing.rank,
        }
    }
}

/// `final-result` payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResultMessage {
    /// Every registered player, best first
    pub classement: Vec<FinalEntry>,
}

/// `score/{id}` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreMessage {
    /// The player's final score
    pub score: u64,
    /// Number of rounds played
    pub total: usize,
    /// The player's competition rank
    pub rank: usize,
    /// Number of registered players
    pub total_players: usize,
    /// Points earned in each round, 0 where the player did not answer
    #[serde(default)]
    pub rounds: Vec<u64>,
}

/// Errors produced when decoding an inbound payload
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload does not match the topic's shape
    #[error("malformed {topic} payload: {source}")]
    Malformed {
        /// Topic the payload arrived on
        topic: Topic,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
    /// Nothing is expected on this topic by the receiving side
    #[error("unexpected message on {0}")]
    UnexpectedTopic(Topic),
}

fn decode<'a, T: Deserialize<'a>>(topic: &Topic, payload: &'a str) -> Result<T, DecodeError> {
    serde_json::from_str(payload).map_err(|source| DecodeError::Malformed {
        topic: topic.clone(),
        source,
    })
}

/// Messages the orchestrator consumes
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum Inbound {
    /// A player announced itself
    Presence(PresenceMessage),
    /// A player answered
    Answer(AnswerMessage),
}

impl Inbound {
    /// Decodes a payload received on `topic`
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] for a payload that does not fit the
    /// topic and [`DecodeError::UnexpectedTopic`] for topics the orchestrator
    /// does not consume.
    pub fn decode(topic: &Topic, payload: &str) -> Result<Self, DecodeError> {
        match topic {
            Topic::Presence => decode::<PresenceMessage>(topic, payload).map(Into::into),
            Topic::Answer => decode::<AnswerMessage>(topic, payload).map(Into::into),
            _ => Err(DecodeError::UnexpectedTopic(topic.clone())),
        }
    }
}

/// Messages a player consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInbound {
    /// A new round opened
    Question(QuestionMessage),
    /// The verdict on this player's answer
    Feedback(FeedbackMessage),
    /// Live standings
    Leaderboard(LeaderboardMessage),
    /// Final standings
    FinalResult(FinalResultMessage),
    /// This player's final score
    Score(ScoreMessage),
}

impl PlayerInbound {
    /// Decodes a payload received on `topic`
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] for a payload that does not fit the
    /// topic and [`DecodeError::UnexpectedTopic`] for topics players do not
    /// consume.
    pub fn decode(topic: &Topic, payload: &str) -> Result<Self, DecodeError> {
        match topic {
            Topic::Question => decode(topic, payload).map(Self::Question),
            Topic::Feedback(_) => decode(topic, payload).map(Self::Feedback),
            Topic::Leaderboard => decode(topic, payload).map(Self::Leaderboard),
            Topic::FinalResult => decode(topic, payload).map(Self::FinalResult),
            Topic::Score(_) => decode(topic, payload).map(Self::Score),
            _ => Err(DecodeError::UnexpectedTopic(topic.clone())),
        }
    }
}

/// Messages published by either side of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Player announcement
    Presence(PresenceMessage),
    /// Player answer
    Answer(AnswerMessage),
    /// Round broadcast
    Question(QuestionMessage),
    /// Verdict for one player
    Feedback {
        /// Recipient
        to: Id,
        /// Verdict
        feedback: FeedbackMessage,
    },
    /// Live standings
    Leaderboard(LeaderboardMessage),
    /// Final standings
    FinalResult(FinalResultMessage),
    /// Personal final score
    Score {
        /// Recipient
        to: Id,
        /// Score summary
        score: ScoreMessage,
    },
}

impl Outgoing {
    /// Returns the topic this message is published on
    pub fn topic(&self) -> Topic {
        match self {
            Self::Presence(_) => Topic::Presence,
            Self::Answer(_) => Topic::Answer,
            Self::Question(_) => Topic::Question,
            Self::Feedback { to, .. } => Topic::Feedback(to.clone()),
            Self::Leaderboard(_) => Topic::Leaderboard,
            Self::FinalResult(_) => Topic::FinalResult,
            Self::Score { to, .. } => Topic::Score(to.clone()),
        }
    }

    /// Converts the message to its JSON payload
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_payload(&self) -> String {
        match self {
            Self::Presence(m) => serde_json::to_string(m),
            Self::Answer(m) => serde_json::to_string(m),
            Self::Question(m) => serde_json::to_string(m),
            Self::Feedback { feedback, .. } => serde_json::to_string(feedback),
            Self::Leaderboard(m) => serde_json::to_string(m),
            Self::FinalResult(m) => serde_json::to_string(m),
            Self::Score { score, .. } => serde_json::to_string(score),
        }
        .expect("default serializer cannot fail")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    #[test]
    fn test_topic_paths() {
        assert_eq!(Topic::Presence.path("quiz"), "quiz/presence");
        assert_eq!(Topic::FinalResult.path("quiz"), "quiz/final-result");
        assert_eq!(Topic::Feedback(id("ab12")).path("quiz"), "quiz/feedback/ab12");
        assert_eq!(Topic::Score(id("ab12")).path("room/7"), "room/7/score/ab12");
    }

    #[test]
    fn test_topic_parse() {
        assert_eq!(Topic::parse("quiz", "quiz/answer"), Some(Topic::Answer));
        assert_eq!(
            Topic::parse("quiz", "quiz/feedback/ab12"),
            Some(Topic::Feedback(id("ab12")))
        );
        assert_eq!(Topic::parse("quiz", "other/answer"), None);
        assert_eq!(Topic::parse("quiz", "quizanswer"), None);
        assert_eq!(Topic::parse("quiz", "quiz/feedback/"), None);
        assert_eq!(Topic::parse("quiz", "quiz/bogus"), None);
    }

    #[test]
    fn test_decode_presence_without_nickname() {
        let inbound = Inbound::decode(&Topic::Presence, r#"{"id": "ab12"}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Presence(PresenceMessage {
                id: id("ab12"),
                nickname: String::new()
            })
        );
    }

    #[test]
    fn test_decode_answer_with_sentinel() {
        let inbound = Inbound::decode(
            &Topic::Answer,
            r#"{"question_id": 3, "answer_index": -1, "client_id": "ab12"}"#,
        )
        .unwrap();

        assert_eq!(
            inbound,
            Inbound::Answer(AnswerMessage {
                question_id: 3,
                answer_index: Choice::NoAnswer,
                client_id: id("ab12"),
            })
        );
    }

    #[test]
    fn test_decode_malformed_payloads() {
        let cases = [
            (Topic::Answer, "not json"),
            (Topic::Answer, r#"{"question_id": 0, "client_id": "ab12"}"#),
            (
                Topic::Answer,
                r#"{"question_id": 0, "answer_index": -7, "client_id": "ab12"}"#,
            ),
            (
                Topic::Answer,
                r#"{"question_id": 0, "answer_index": 1, "client_id": ""}"#,
            ),
            (Topic::Presence, r#"{"nickname": "no id"}"#),
        ];

        for (topic, payload) in cases {
            assert!(
                matches!(
                    Inbound::decode(&topic, payload),
                    Err(DecodeError::Malformed { .. })
                ),
                "{payload} should be malformed"
            );
        }
    }

    #[test]
    fn test_decode_unexpected_topic() {
        assert!(matches!(
            Inbound::decode(&Topic::Leaderboard, "[]"),
            Err(DecodeError::UnexpectedTopic(Topic::Leaderboard))
        ));
        assert!(matches!(
            PlayerInbound::decode(&Topic::Answer, "{}"),
            Err(DecodeError::UnexpectedTopic(Topic::Answer))
        ));
    }

    #[test]
    fn test_feedback_payload_fields() {
        let message = Outgoing::Feedback {
            to: id("ab12"),
            feedback: FeedbackMessage {
                question_id: Some(3),
                correct: false,
                answer_index: Choice::NoAnswer,
                correct_answer_index: 2,
            },
        };

        assert_eq!(message.topic(), Topic::Feedback(id("ab12")));
        let value: serde_json::Value = serde_json::from_str(&message.to_payload()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"question_id": 3, "correct": false, "answer_index": -1, "correct_answer_index": 2})
        );
    }

    #[test]
    fn test_decode_feedback_without_round() {
        let inbound = PlayerInbound::decode(
            &Topic::Feedback(id("ab12")),
            r#"{"correct": true, "answer_index": 1, "correct_answer_index": 1}"#,
        )
        .unwrap();

        assert!(matches!(
            inbound,
            PlayerInbound::Feedback(FeedbackMessage {
                question_id: None,
                correct: true,
                ..
            })
        ));
    }

    #[test]
    fn test_leaderboard_and_final_payload_shapes() {
        let standing = Standing {
            rank: 1,
            id: id("ab12"),
            nickname: "Ann".to_string(),
            score: 4,
        };

        let leaderboard = Outgoing::Leaderboard(LeaderboardMessage(vec![(&standing).into()]));
        let value: serde_json::Value = serde_json::from_str(&leaderboard.to_payload()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"rank": 1, "pseudo": "Ann", "score": 4}])
        );

        let result = Outgoing::FinalResult(FinalResultMessage {
            classement: vec![(&standing).into()],
        });
        let value: serde_json::Value = serde_json::from_str(&result.to_payload()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"classement": [{"client_id": "ab12", "nickname": "Ann", "score": 4, "rank": 1}]})
        );
    }
}
