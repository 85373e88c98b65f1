//! Questions and question pools
//!
//! A session draws its questions once, at start, from a pool that is
//! either the built-in static set, a set loaded from JSON, or a set the
//! operator authored before starting. Questions are immutable once drawn.

use std::time::Duration;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{question, session};

type ValidationResult = garde::Result;

/// Validates that the correct option index points into the options list
fn validate_correct(options: &[String]) -> impl FnOnce(&usize, &()) -> ValidationResult + '_ {
    move |correct, _| {
        if *correct < options.len() {
            Ok(())
        } else {
            Err(garde::Error::new(format!(
                "correct option {correct} is outside of the {} options",
                options.len()
            )))
        }
    }
}

/// A multiple choice question
///
/// The serialized field names follow the question files used by existing
/// deployments: `{"question": ..., "options": [...], "answer": 1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// The prompt shown to players
    #[serde(rename = "question")]
    #[garde(length(chars, min = 1, max = question::MAX_PROMPT_LENGTH))]
    pub prompt: String,
    /// The ordered answer options
    #[garde(
        length(min = question::MIN_OPTION_COUNT, max = question::MAX_OPTION_COUNT),
        inner(length(chars, min = 1, max = question::MAX_OPTION_LENGTH))
    )]
    pub options: Vec<String>,
    /// Index of the correct option
    #[serde(rename = "answer")]
    #[garde(custom(validate_correct(&self.options)))]
    pub correct: usize,
}

impl Question {
    /// Creates a question without validating it
    pub fn new<P, O, S>(prompt: P, options: O, correct: usize) -> Self
    where
        P: Into<String>,
        O: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            options: options.into_iter().map(Into::into).collect(),
            correct,
        }
    }
}

/// A question drawn into a session, with its in-session index and time budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedQuestion {
    /// Stable 0-based index within the session, in draw order
    pub index: usize,
    /// The wrapped question
    pub question: Question,
    /// Nominal time players have to answer
    pub time_limit: Duration,
}

/// Errors that can occur when building or loading a pool
#[derive(Error, Debug)]
pub enum Error {
    /// A question failed validation
    #[error("invalid question: {0}")]
    Invalid(#[from] garde::Report),
    /// The pool file could not be parsed
    #[error("malformed question file: {0}")]
    Json(#[from] serde_json::Error),
    /// The pool already holds the maximum number of questions
    #[error("question pool is full")]
    Full,
}

/// The set of questions a session may draw from
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(transparent)]
pub struct QuestionPool {
    #[garde(length(max = session::MAX_POOL_SIZE), dive)]
    questions: Vec<Question>,
}

impl QuestionPool {
    /// Builds a pool from a list of questions after validating every one
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if any question fails validation.
    pub fn new(questions: Vec<Question>) -> Result<Self, Error> {
        let pool = Self { questions };
        pool.validate()?;
        Ok(pool)
    }

    /// Parses a pool from a JSON array of `{question, options, answer}` objects
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a valid question list and
    /// [`Error::Invalid`] if any question fails validation.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Self::new(serde_json::from_str(text)?)
    }

    /// The static question set used when the operator supplies none
    pub fn builtin() -> Self {
        Self {
            questions: vec![
                Question::new(
                    "What is the capital of France?",
                    ["Berlin", "Madrid", "Paris", "Rome"],
                    2,
                ),
                Question::new(
                    "How many bits are in a byte?",
                    ["4", "8", "16", "32"],
                    1,
                ),
                Question::new(
                    "Which planet is known as the Red Planet?",
                    ["Venus", "Jupiter", "Mars", "Saturn"],
                    2,
                ),
                Question::new(
                    "Which protocol is commonly used for lightweight publish/subscribe messaging?",
                    ["FTP", "MQTT", "SMTP", "SNMP"],
                    1,
                ),
                Question::new(
                    "What is the chemical symbol for gold?",
                    ["Ag", "Au", "Gd", "Go"],
                    1,
                ),
                Question::new(
                    "Which ocean is the largest?",
                    ["Atlantic", "Indian", "Arctic", "Pacific"],
                    3,
                ),
                Question::new("Is the Earth flat?", ["Yes", "No"], 1),
            ],
        }
    }

    /// Appends an operator-authored question
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if the question fails validation and
    /// [`Error::Full`] if the pool cannot take more questions.
    pub fn push(&mut self, question: Question) -> Result<(), Error> {
        question.validate()?;
        if self.questions.len() >= session::MAX_POOL_SIZE {
            return Err(Error::Full);
        }
        self.questions.push(question);
        Ok(())
    }

    /// Returns the number of questions in the pool
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Checks if the pool holds no question
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Draws `count` distinct questions without replacement
    ///
    /// Drawn questions are numbered `0..count` in the order they were drawn
    /// and all share the same time budget.
    ///
    /// # Returns
    ///
    /// `None` if the pool holds fewer than `count` questions
    pub fn draw(
        &self,
        count: usize,
        time_limit: Duration,
        rng: &mut fastrand::Rng,
    ) -> Option<Vec<IndexedQuestion>> {
        if count > self.questions.len() {
            return None;
        }

        let mut indices = (0..self.questions.len()).collect_vec();
        rng.shuffle(&mut indices);

        Some(
            indices
                .into_iter()
                .take(count)
                .enumerate()
                .map(|(index, drawn)| IndexedQuestion {
                    index,
                    question: self.questions[drawn].clone(),
                    time_limit,
                })
                .collect_vec(),
        )
    }
}
