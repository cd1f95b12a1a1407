//! Event types for the jukebot playback stack
//!
//! The stack uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many notification of the
//!   external command/gateway layer (track started, track failed, ...)
//! - **Command channels** (tokio::mpsc): request → single player loop
//! - **Shared state** (Arc<RwLock<T>>): read-heavy access
//!
//! Events are serializable so the gateway layer can forward them to chat
//! messages or diagnostics without re-shaping them.

use crate::track::Track;
use crate::SessionKey;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Player state machine states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum PlaybackState {
    /// No current track; waiting for work
    Idle,
    /// Waiting for the head track's artifact to become ready
    Preparing,
    /// Artifact handed to the audio output, streaming
    Playing,
    /// Output suspended by user command
    Paused,
    /// Skip in progress (output stopping, queue about to advance)
    Skipping,
    /// Session torn down; loop has exited
    Stopped,
    /// Unrecoverable audio-transport failure
    Error,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Preparing => write!(f, "Preparing"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Paused => write!(f, "Paused"),
            PlaybackState::Skipping => write!(f, "Skipping"),
            PlaybackState::Stopped => write!(f, "Stopped"),
            PlaybackState::Error => write!(f, "Error"),
        }
    }
}

/// Download lifecycle of one track's local artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DownloadStatus {
    /// Not yet fetched
    Pending,
    /// Fetch in progress (counts against the per-session download cap)
    Downloading,
    /// Artifact materialized on disk
    Ready,
    /// Last fetch attempt failed; permanent once the retry budget is spent
    Failed,
    /// Artifact released; a later fetch starts over from scratch
    Evicted,
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::Pending => write!(f, "Pending"),
            DownloadStatus::Downloading => write!(f, "Downloading"),
            DownloadStatus::Ready => write!(f, "Ready"),
            DownloadStatus::Failed => write!(f, "Failed"),
            DownloadStatus::Evicted => write!(f, "Evicted"),
        }
    }
}

/// Jukebot event types
///
/// Events are broadcast via [`EventBus`]. All sessions share one bus;
/// every event carries its session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Player state machine transition
    StateChanged {
        session: SessionKey,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track's artifact was handed to the audio output
    TrackStarted {
        session: SessionKey,
        track: Track,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track finished (naturally or via skip) and was advanced past
    TrackCompleted {
        session: SessionKey,
        track_id: Uuid,
        title: String,
        /// false for natural completion, true when skipped
        skipped: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track exhausted its retry budget and was skipped as unplayable
    TrackFailed {
        session: SessionKey,
        track_id: Uuid,
        title: String,
        source_url: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every remaining queue entry failed; player returned to Idle
    QueueExhausted {
        session: SessionKey,
        consecutive_failures: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session stopped and its resources released
    SessionStopped {
        session: SessionKey,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Session key this event belongs to.
    pub fn session(&self) -> SessionKey {
        match self {
            PlayerEvent::StateChanged { session, .. } => *session,
            PlayerEvent::TrackStarted { session, .. } => *session,
            PlayerEvent::TrackCompleted { session, .. } => *session,
            PlayerEvent::TrackFailed { session, .. } => *session,
            PlayerEvent::QueueExhausted { session, .. } => *session,
            PlayerEvent::SessionStopped { session, .. } => *session,
        }
    }
}

/// Broadcast bus for player events
///
/// Thin wrapper over `tokio::sync::broadcast` shared by all sessions.
/// Emission never blocks; slow subscribers lose old events rather than
/// back-pressuring a playback loop.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; errors when there are no subscribers.
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscribers case.
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
