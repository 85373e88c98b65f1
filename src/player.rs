//! Player identity
//!
//! Players identify themselves with an opaque id that they generate on
//! startup. The orchestrator never issues ids; it only learns them from
//! presence announcements, so any non-empty string is accepted.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::player::SHORT_ID_LENGTH;

/// A unique, client-generated identifier for a player
///
/// Ids travel as plain strings on the bus and are embedded in per-player
/// topic names, so they must be non-empty and free of `/` and whitespace.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(String);

/// Errors produced when parsing an [`Id`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The id is empty
    #[error("player id cannot be empty")]
    Empty,
    /// The id contains a character that cannot appear in a topic segment
    #[error("player id contains a forbidden character")]
    ForbiddenCharacter,
}

impl Id {
    /// Creates a new random player id
    ///
    /// The id is the first few hex digits of a v4 UUID, short enough to be
    /// shown in a placeholder nickname.
    pub fn new() -> Self {
        let mut simple = Uuid::new_v4().simple().to_string();
        simple.truncate(SHORT_ID_LENGTH);
        Self(simple)
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the leading characters of the id used in placeholder names
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LENGTH) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl Default for Id {
    /// Creates a new random player id (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = Error;

    /// Parses an id announced by a client
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] for an empty string and
    /// [`Error::ForbiddenCharacter`] if the id contains `/`, `+`, `#` or
    /// whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::Empty);
        }
        if s
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '+' | '#'))
        {
            return Err(Error::ForbiddenCharacter);
        }
        Ok(Self(s.to_owned()))
    }
}
