//! Track descriptors
//!
//! A [`Track`] is produced by the media-resolution collaborator when a user
//! request is accepted. Identity fields are fixed at creation; download
//! progress and the local artifact are tracked by the player's buffer
//! manager, never on the track itself.

use crate::human_time::format_track_duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One resolved, playable track request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Unique identity for this queue occurrence of the track
    pub id: Uuid,

    /// Source URL or search query this track was resolved from
    pub source_url: String,

    /// Resolved display title
    pub title: String,

    /// Duration in seconds (None until the resolver reports it)
    pub duration_secs: Option<u64>,

    /// Uploader / channel display name, when the source provides one
    pub uploader: Option<String>,

    /// Display name of the user who requested the track
    pub requested_by: String,
}

impl Track {
    /// Create a track with a fresh identity.
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        duration_secs: Option<u64>,
        uploader: Option<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.into(),
            title: title.into(),
            duration_secs,
            uploader,
            requested_by: requested_by.into(),
        }
    }

    /// Human-readable duration (`M:SS`, `H:MM:SS`, or "unknown").
    pub fn duration_display(&self) -> String {
        format_track_duration(self.duration_secs)
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.title, self.duration_display())
    }
}
