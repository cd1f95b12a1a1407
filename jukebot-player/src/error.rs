//! Error types for jukebot-player
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Track-level resolution failures never abort a session;
//! only transport-level failures can terminate a playback loop.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for jukebot-player
#[derive(Error, Debug)]
pub enum Error {
    /// Track exhausted its retry budget and is permanently unplayable
    #[error("Track {track_id} failed permanently after {attempts} fetch attempts")]
    ResolutionExhausted { track_id: Uuid, attempts: u32 },

    /// Audio output / voice transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Queue index outside `[0, len)`
    #[error("Queue index {index} out of range (length {len})")]
    OutOfRange { index: usize, len: usize },

    /// Command not valid in the player's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for permanent per-track failures the player must skip past.
    pub fn is_permanent_track_failure(&self) -> bool {
        matches!(self, Error::ResolutionExhausted { .. })
    }
}

/// Convenience Result type using jukebot-player Error
pub type Result<T> = std::result::Result<T, Error>;
