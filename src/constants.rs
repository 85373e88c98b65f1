//! Configuration constants for the quiz session engine
//!
//! This module contains the limits and constraints used throughout the
//! engine to keep questions, start parameters and the player registry
//! within sane boundaries.

/// Session-wide limits
pub mod session {
    /// Maximum number of players a single session will register
    pub const MAX_PLAYER_COUNT: usize = 1000;
    /// Maximum number of questions a pool may hold
    pub const MAX_POOL_SIZE: usize = 500;
}

/// Question configuration constants
pub mod question {
    /// Maximum length of a question prompt in characters
    pub const MAX_PROMPT_LENGTH: usize = 300;
    /// Minimum number of options a question must offer
    pub const MIN_OPTION_COUNT: usize = 2;
    /// Maximum number of options a question may offer
    pub const MAX_OPTION_COUNT: usize = 6;
    /// Maximum length of a single option label
    pub const MAX_OPTION_LENGTH: usize = 200;
    /// Minimum per-question time budget in seconds
    pub const MIN_TIME_LIMIT: u64 = 5;
    /// Maximum per-question time budget in seconds
    pub const MAX_TIME_LIMIT: u64 = 60;
}

/// Player identity and nickname constants
pub mod player {
    /// Number of characters kept from a generated UUID for a player id
    pub const SHORT_ID_LENGTH: usize = 8;
    /// Maximum nickname length in characters, longer nicknames are truncated
    pub const MAX_NICKNAME_LENGTH: usize = 30;
    /// Prefix of the placeholder nickname given to players without one
    pub const PLACEHOLDER_PREFIX: &str = "Player-";
}

/// Wire protocol constants
pub mod wire {
    /// Value of `answer_index` meaning "no answer / timed out"
    pub const NO_ANSWER: i64 = -1;
    /// Cadence of the player-side countdown in seconds
    pub const TICK_SECONDS: u64 = 1;
    /// Smallest round grace in seconds
    ///
    /// A player's countdown expires one tick after it reaches zero, so the
    /// "no answer" sentinel leaves about `TICK_SECONDS` after the time limit
    /// and must still reach the orchestrator before the round closes.
    pub const MIN_GRACE_SECONDS: u64 = TICK_SECONDS + 1;
}
