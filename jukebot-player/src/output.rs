//! Audio-output collaborator contract
//!
//! The output collaborator accepts a ready artifact and streams it to the
//! session's voice channel. Encoding and transport internals live outside
//! this crate; the player loop only depends on these traits.

use crate::error::Result;
use async_trait::async_trait;
use jukebot_common::SessionKey;
use std::path::Path;

/// Terminal outcome reported by the output collaborator for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Track streamed to its natural end
    Completed,

    /// Output halted by an explicit stop (skip, stop, forced disconnect)
    Stopped,

    /// Transport-level failure (voice connection lost, encoder crash, ...)
    Error(String),
}

/// Audio-output collaborator. One instance serves all sessions.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Begin streaming `artifact` to the session's voice channel.
    ///
    /// Returns a handle controlling this one track's playback. Errors here
    /// are transport failures (no voice connection, device refused).
    async fn begin(&self, session: SessionKey, artifact: &Path) -> Result<Box<dyn OutputHandle>>;
}

/// Control handle for one in-flight track.
#[async_trait]
pub trait OutputHandle: Send {
    /// Wait for the track's terminal event.
    ///
    /// Must be cancel-safe: the player loop polls this inside `select!`
    /// alongside its command channel.
    async fn wait(&mut self) -> OutputEvent;

    /// Suspend output without losing position.
    async fn pause(&mut self) -> Result<()>;

    /// Resume suspended output.
    async fn resume(&mut self) -> Result<()>;

    /// Halt output; `wait` will observe [`OutputEvent::Stopped`] if it is
    /// still being polled.
    async fn stop(&mut self) -> Result<()>;
}
