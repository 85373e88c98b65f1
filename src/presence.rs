//! Presence registry
//!
//! This module tracks which players have announced themselves to the
//! orchestrator and the display name each one is known by. There is no
//! leave protocol, so the registry only grows for the life of a session.

use std::collections::HashMap;

use rustrict::CensorStr;
use thiserror::Error;

use crate::{
    constants::{player, session},
    player::Id,
};

/// Errors that can occur when registering a player
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The session has reached the maximum number of allowed players
    #[error("maximum number of players reached")]
    MaximumPlayers,
}

/// Registry of known players and their display names
///
/// Registration is idempotent: the first nickname announced for an id wins
/// and later announcements for the same id are ignored.
#[derive(Debug, Clone)]
pub struct Presence {
    /// Display name of every registered player
    nicknames: HashMap<Id, String>,
    /// Maximum number of players accepted
    capacity: usize,

    /// Registration order, kept for stable iteration
    order: Vec<Id>,
}

impl Default for Presence {
    fn default() -> Self {
        Self::with_capacity(session::MAX_PLAYER_COUNT)
    }
}

impl Presence {
    /// Creates an empty registry accepting at most `capacity` players
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nicknames: HashMap::new(),
            capacity,
            order: Vec::new(),
        }
    }

    /// Registers a player under the nickname they announced
    ///
    /// The nickname is cleaned before being stored: surrounding whitespace
    /// is trimmed, overly long names are truncated and empty or
    /// inappropriate names are replaced by a placeholder built from the id.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the player is new, `Ok(false)` if the id was already
    /// registered (the stored nickname is left untouched)
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaximumPlayers`] if the registry is full.
    pub fn register(&mut self, id: Id, nickname: &str) -> Result<bool, Error> {
        if self.nicknames.contains_key(&id) {
            return Ok(false);
        }
        if self.nicknames.len() >= self.capacity {
            return Err(Error::MaximumPlayers);
        }

        let name = clean_nickname(&id, nickname);
        self.nicknames.insert(id.clone(), name);
        self.order.push(id);
        Ok(true)
    }

    /// Returns the number of distinct registered players
    pub fn count(&self) -> usize {
        self.nicknames.len()
    }

    /// Checks whether no player has registered yet
    pub fn is_empty(&self) -> bool {
        self.nicknames.is_empty()
    }

    /// Checks whether a player id is registered
    pub fn contains(&self, id: &Id) -> bool {
        self.nicknames.contains_key(id)
    }

    /// Returns the display name of a registered player
    pub fn nickname_of(&self, id: &Id) -> Option<&str> {
        self.nicknames.get(id).map(String::as_str)
    }

    /// Iterates over registered players in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &str)> {
        self.order
            .iter()
            .filter_map(|id| self.nicknames.get(id).map(|name| (id, name.as_str())))
    }
}

/// Returns the placeholder display name for a player without a usable nickname
pub fn placeholder(id: &Id) -> String {
    format!("{}{}", player::PLACEHOLDER_PREFIX, id.short())
}

fn clean_nickname(id: &Id, nickname: &str) -> String {
    let trimmed = rustrict::trim_whitespace(nickname);
    if trimmed.is_empty() || trimmed.is_inappropriate() {
        return placeholder(id);
    }
    trimmed.chars().take(player::MAX_NICKNAME_LENGTH).collect()
}
