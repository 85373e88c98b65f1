//! Session configuration
//!
//! [`Config`] holds the settings an operator fixes once per deployment and
//! is usually read from a TOML file. [`StartRequest`] carries the parameters
//! of a single "start session" action and is validated before the
//! orchestrator leaves `Idle`.

use std::{path::Path, time::Duration};

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use thiserror::Error;

use crate::constants::{question, session, wire};

type ValidationResult = garde::Result;

/// Validates that a duration is within the specified bounds (in seconds)
fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&val.as_secs()) && val.subsec_nanos() == 0 {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} must be a whole number of seconds within [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

/// Validates the per-question time budget of a session
fn validate_time_limit(val: &Duration) -> ValidationResult {
    validate_duration::<{ question::MIN_TIME_LIMIT }, { question::MAX_TIME_LIMIT }>(
        "time_limit",
        val,
    )
}

/// Validates that the round grace covers the player's expiry tick
fn validate_grace(val: &Duration) -> ValidationResult {
    if *val >= Duration::from_secs(wire::MIN_GRACE_SECONDS) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "grace must be at least {} seconds",
            wire::MIN_GRACE_SECONDS
        )))
    }
}

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum Error {
    /// The file could not be parsed
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    /// A value is out of bounds
    #[error("invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

/// Deployment-wide settings of an orchestrator
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Prefix prepended to every topic name
    #[garde(length(min = 1))]
    pub topic_prefix: String,
    /// Extra time added to each round's deadline to absorb publish latency
    #[garde(custom(|v, _| validate_grace(v)))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub grace: Duration,
    /// Pause between a round's feedback and the next question
    #[garde(skip)]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub feedback_pause: Duration,
    /// Maximum number of players accepted in a session
    #[garde(range(min = 1, max = session::MAX_PLAYER_COUNT))]
    pub max_players: usize,
    /// Number of messages the in-process bus buffers per subscriber
    #[garde(skip)]
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic_prefix: "quiz".to_string(),
            grace: Duration::from_secs(2),
            feedback_pause: Duration::from_secs(5),
            max_players: session::MAX_PLAYER_COUNT,
            bus_capacity: 1024,
        }
    }
}

impl Config {
    /// Parses a configuration from TOML text; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`Error::Toml`] if the text is not valid TOML or a value has
    /// the wrong type, and [`Error::Invalid`] if a value is out of bounds
    /// (e.g. a grace shorter than the player's expiry tick).
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `path` if it exists, then applies
    /// environment overrides (`QUIZCAST_TOPIC_PREFIX`)
    ///
    /// A missing, unparsable or out-of-bounds file falls back to the defaults.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "no configuration file, using defaults");
                Self::default()
            }
        };

        if let Ok(prefix) = std::env::var("QUIZCAST_TOPIC_PREFIX")
            && !prefix.is_empty()
        {
            config.topic_prefix = prefix;
        }

        config
    }
}

/// Parameters of an operator's "start session" action
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StartRequest {
    /// Number of questions to draw from the pool
    #[garde(range(min = 1))]
    pub question_count: usize,
    /// Time players have to answer each question
    #[garde(custom(|v, _| validate_time_limit(v)))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub time_limit: Duration,
}

impl StartRequest {
    /// Creates a start request for `question_count` questions of `seconds` each
    pub fn new(question_count: usize, seconds: u64) -> Self {
        Self {
            question_count,
            time_limit: Duration::from_secs(seconds),
        }
    }
}
