//! # Jukebot Common Library
//!
//! Shared code for the jukebot playback stack:
//! - Track descriptors and download/playback state enums
//! - Event types (PlayerEvent enum) and EventBus
//! - Configuration file and scratch-folder resolution
//! - Logging initialization
//! - Duration display formatting

pub mod config;
pub mod events;
pub mod human_time;
pub mod logging;
pub mod track;

pub use events::{DownloadStatus, EventBus, PlaybackState, PlayerEvent};
pub use track::Track;

/// Session key: one independent playback context per voice-capable
/// destination (guild/channel unit, assigned by the chat platform).
pub type SessionKey = u64;
