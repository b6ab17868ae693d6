//! Error types shared across the scoreboard

use thiserror::Error;

/// Errors reported back to the caller that issued a command.
///
/// None of these are fatal to the process and none are broadcast to viewers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreboardError {
    /// Malformed or out-of-range input; state was left untouched
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request channel received an event name it does not know
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A state mutex was poisoned by a panicking holder
    #[error("failed to lock {0} state")]
    StateLock(&'static str),
}

pub type Result<T> = std::result::Result<T, ScoreboardError>;
