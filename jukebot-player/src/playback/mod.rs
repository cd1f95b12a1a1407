//! Playback core
//!
//! One [`Player`] per session drives a queue + buffer-manager pair from a
//! single loop task; command handlers only post requests to that loop.

pub mod buffer_manager;
pub mod engine;
pub mod queue;

pub use buffer_manager::BufferManager;
pub use engine::{Player, PlayerSnapshot, QueueEntryInfo};
pub use queue::{LoopMode, PlaybackQueue};
