//! Playback queue
//!
//! Per-session ordered collection of tracks with a cursor and loop mode.
//! Owned by exactly one player; every mutation happens under that player's
//! queue guard, and only the player loop calls `advance`/`skip_to`/`clear`.

use crate::error::{Error, Result};
use jukebot_common::track::Track;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Loop behavior applied by `advance`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LoopMode {
    /// Play through once; the queue empties past the last entry
    #[default]
    Off,
    /// Repeat the current entry
    Single,
    /// Cycle through all entries, wrapping to the first
    All,
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Off => write!(f, "Off"),
            LoopMode::Single => write!(f, "Single"),
            LoopMode::All => write!(f, "All"),
        }
    }
}

/// Ordered track sequence with a cursor.
///
/// Invariant: the cursor is a valid index whenever the queue is non-empty,
/// and `None` exactly when the queue is empty.
pub struct PlaybackQueue {
    entries: Vec<Arc<Track>>,
    cursor: Option<usize>,
    loop_mode: LoopMode,
}

impl PlaybackQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            loop_mode: LoopMode::Off,
        }
    }

    /// Append a track to the end of the queue. O(1), always succeeds.
    ///
    /// The first track added to an empty queue becomes current.
    pub fn add(&mut self, track: Arc<Track>) {
        self.entries.push(track);
        if self.cursor.is_none() {
            self.cursor = Some(self.entries.len() - 1);
        }
    }

    /// Track at the cursor, or None when empty.
    pub fn current(&self) -> Option<Arc<Track>> {
        self.cursor.map(|i| Arc::clone(&self.entries[i]))
    }

    /// Move the cursor per the loop mode. O(1). No-op on an empty queue.
    ///
    /// - `Off`: forward; falling off the end empties the queue
    /// - `Single`: cursor unchanged (repeats current)
    /// - `All`: forward, wrapping to index 0
    ///
    /// Returns the new current track.
    pub fn advance(&mut self) -> Option<Arc<Track>> {
        let Some(i) = self.cursor else {
            return None;
        };

        match self.loop_mode {
            LoopMode::Single => {}
            LoopMode::Off => {
                if i + 1 < self.entries.len() {
                    self.cursor = Some(i + 1);
                } else {
                    self.entries.clear();
                    self.cursor = None;
                }
            }
            LoopMode::All => {
                self.cursor = Some((i + 1) % self.entries.len());
            }
        }

        self.current()
    }

    /// Set the cursor directly. O(1).
    ///
    /// Returns `Ok(None)` on an empty queue (no-op, callers check
    /// `current()` before acting) and `OutOfRange` for an invalid index;
    /// cursor and entries are left unchanged on failure.
    pub fn skip_to(&mut self, index: usize) -> Result<Option<Arc<Track>>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        if index >= self.entries.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.cursor = Some(index);
        Ok(self.current())
    }

    /// Remove all entries. O(n).
    ///
    /// Returns the drained tracks so the caller can release their
    /// artifacts through the buffer manager.
    pub fn clear(&mut self) -> Vec<Arc<Track>> {
        self.cursor = None;
        std::mem::take(&mut self.entries)
    }

    /// Pure state change; existing entries are untouched.
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in queue order.
    pub fn entries(&self) -> &[Arc<Track>] {
        &self.entries
    }

    /// Up to `n` upcoming tracks starting at the cursor: the prefetch
    /// window. Wraps in `All` mode, never yielding an entry twice.
    pub fn lookahead(&self, n: usize) -> Vec<Arc<Track>> {
        let Some(start) = self.cursor else {
            return Vec::new();
        };
        let len = self.entries.len();
        let take = n.min(len);

        let mut window = Vec::with_capacity(take);
        for k in 0..take {
            let idx = start + k;
            if idx < len {
                window.push(Arc::clone(&self.entries[idx]));
            } else if self.loop_mode == LoopMode::All {
                window.push(Arc::clone(&self.entries[idx % len]));
            } else {
                break;
            }
        }
        window
    }

    /// Identities of every entry, for stale-download cleanup.
    pub fn track_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|t| t.id).collect()
    }

    /// Identities of entries more than one slot behind the cursor; their
    /// artifacts are no longer needed.
    pub fn behind_cursor_ids(&self) -> Vec<Uuid> {
        let Some(cursor) = self.cursor else {
            return Vec::new();
        };
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| i + 1 < cursor)
            .map(|(_, t)| t.id)
            .collect()
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(n: u8) -> Arc<Track> {
        Arc::new(Track::new(
            format!("https://example.com/{}", n),
            format!("Track {}", n),
            Some(60),
            None,
            "tester",
        ))
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = PlaybackQueue::new();
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
        assert!(queue.advance().is_none());
        assert!(queue.skip_to(0).unwrap().is_none());
        assert!(queue.lookahead(3).is_empty());
    }

    #[test]
    fn test_first_add_becomes_current() {
        let mut queue = PlaybackQueue::new();
        let t1 = track(1);
        queue.add(Arc::clone(&t1));
        assert_eq!(queue.current().unwrap().id, t1.id);
        assert_eq!(queue.cursor(), Some(0));

        // Later adds don't move the cursor
        queue.add(track(2));
        assert_eq!(queue.current().unwrap().id, t1.id);
    }

    #[test]
    fn test_advance_off_mode_empties_past_end() {
        let mut queue = PlaybackQueue::new();
        let (t1, t2) = (track(1), track(2));
        queue.add(Arc::clone(&t1));
        queue.add(Arc::clone(&t2));

        assert_eq!(queue.advance().unwrap().id, t2.id);
        assert!(queue.advance().is_none());
        assert!(queue.is_empty());
        assert!(queue.cursor().is_none());
    }

    #[test]
    fn test_advance_single_mode_never_moves() {
        let mut queue = PlaybackQueue::new();
        let t1 = track(1);
        queue.add(Arc::clone(&t1));
        queue.add(track(2));
        queue.set_loop_mode(LoopMode::Single);

        for _ in 0..5 {
            assert_eq!(queue.advance().unwrap().id, t1.id);
            assert_eq!(queue.current().unwrap().id, t1.id);
        }
    }

    #[test]
    fn test_advance_all_mode_cycles() {
        let mut queue = PlaybackQueue::new();
        let tracks: Vec<_> = (1..=3).map(track).collect();
        for t in &tracks {
            queue.add(Arc::clone(t));
        }
        queue.set_loop_mode(LoopMode::All);

        // len advances return to the first entry
        let first = queue.current().unwrap().id;
        let mut seen = vec![first];
        for _ in 0..3 {
            seen.push(queue.advance().unwrap().id);
        }
        assert_eq!(seen[3], first);
        // all entries were visited
        for t in &tracks {
            assert!(seen.contains(&t.id));
        }
    }

    #[test]
    fn test_skip_to_valid_and_out_of_range() {
        let mut queue = PlaybackQueue::new();
        let tracks: Vec<_> = (1..=3).map(track).collect();
        for t in &tracks {
            queue.add(Arc::clone(t));
        }

        let jumped = queue.skip_to(2).unwrap().unwrap();
        assert_eq!(jumped.id, tracks[2].id);
        assert_eq!(queue.cursor(), Some(2));

        // Out of range leaves cursor and entries unchanged
        let err = queue.skip_to(3).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { index: 3, len: 3 }));
        assert_eq!(queue.cursor(), Some(2));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_clear_returns_drained_entries() {
        let mut queue = PlaybackQueue::new();
        queue.add(track(1));
        queue.add(track(2));

        let drained = queue.clear();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_set_loop_mode_has_no_side_effects() {
        let mut queue = PlaybackQueue::new();
        queue.add(track(1));
        queue.add(track(2));
        let cursor = queue.cursor();

        queue.set_loop_mode(LoopMode::All);
        assert_eq!(queue.loop_mode(), LoopMode::All);
        assert_eq!(queue.cursor(), cursor);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_lookahead_bounded_by_length() {
        let mut queue = PlaybackQueue::new();
        let tracks: Vec<_> = (1..=4).map(track).collect();
        for t in &tracks {
            queue.add(Arc::clone(t));
        }

        let window = queue.lookahead(3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].id, tracks[0].id);
        assert_eq!(window[2].id, tracks[2].id);

        // Window slides with the cursor
        queue.advance();
        let window = queue.lookahead(3);
        assert_eq!(window[0].id, tracks[1].id);
        assert_eq!(window[2].id, tracks[3].id);

        // Near the end in Off mode the window shrinks
        queue.skip_to(3).unwrap();
        assert_eq!(queue.lookahead(3).len(), 1);
    }

    #[test]
    fn test_lookahead_wraps_in_all_mode() {
        let mut queue = PlaybackQueue::new();
        let tracks: Vec<_> = (1..=3).map(track).collect();
        for t in &tracks {
            queue.add(Arc::clone(t));
        }
        queue.set_loop_mode(LoopMode::All);
        queue.skip_to(2).unwrap();

        let window = queue.lookahead(3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].id, tracks[2].id);
        assert_eq!(window[1].id, tracks[0].id);
        assert_eq!(window[2].id, tracks[1].id);
    }

    #[test]
    fn test_behind_cursor_ids() {
        let mut queue = PlaybackQueue::new();
        let tracks: Vec<_> = (1..=4).map(track).collect();
        for t in &tracks {
            queue.add(Arc::clone(t));
        }
        queue.set_loop_mode(LoopMode::All);

        queue.skip_to(3).unwrap();
        // Positions 0 and 1 are more than one slot behind cursor 3
        let behind = queue.behind_cursor_ids();
        assert_eq!(behind, vec![tracks[0].id, tracks[1].id]);
    }
}
