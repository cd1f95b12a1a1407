//! Media-resolution collaborator contract
//!
//! The resolver turns a URL or search text into playable [`Track`]
//! descriptors and materializes their artifacts on disk. Its internals
//! (site extractors, format selection, proxies) are outside this crate;
//! the buffer manager only depends on this trait.

use async_trait::async_trait;
use futures::stream::BoxStream;
use jukebot_common::track::Track;
use std::path::Path;
use thiserror::Error;

/// Resolution failures, as reported by the external resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing playable matched the input
    #[error("No playable media found for {0:?}")]
    NotFound(String),

    /// Source recognized but not supported
    #[error("Unsupported source: {0}")]
    Unsupported(String),

    /// Upstream rate limiting; retry later
    #[error("Rate limited by media source")]
    RateLimited,

    /// Resolution or download exceeded its deadline
    #[error("Media source timed out")]
    Timeout,
}

/// Lazily-produced finite sequence of playlist entries.
pub type TrackStream = BoxStream<'static, Result<Track, ResolveError>>;

/// Shape of a successful resolution, decided once at the collaborator
/// boundary and never re-inspected downstream.
pub enum Resolution {
    /// Input named exactly one track
    SingleTrack(Track),

    /// Playlist-like input; entries arrive lazily
    Playlist(TrackStream),

    /// Free-text search; best matches first
    SearchResult(Vec<Track>),
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::SingleTrack(t) => f.debug_tuple("SingleTrack").field(t).finish(),
            Resolution::Playlist(_) => f.debug_tuple("Playlist").field(&"<stream>").finish(),
            Resolution::SearchResult(t) => f.debug_tuple("SearchResult").field(t).finish(),
        }
    }
}

/// Media-resolution collaborator.
///
/// `fetch` must be cancel-safe: an aborted download may leave a partial
/// file at `dest`, which the buffer manager cleans up with the session
/// scratch folder.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolve a URL or search text into track descriptors.
    async fn resolve(&self, input: &str, requested_by: &str) -> Result<Resolution, ResolveError>;

    /// Materialize the track's media at `dest`.
    ///
    /// On success the file at `dest` is a complete, playable artifact.
    async fn fetch(&self, track: &Track, dest: &Path) -> Result<(), ResolveError>;
}
