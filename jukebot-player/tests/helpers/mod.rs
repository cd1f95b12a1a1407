//! Shared test doubles for player integration tests
//!
//! Provides a scripted media resolver (per-URL failures, fetch delay,
//! concurrency tracking) and a mock audio output (auto-completing or
//! hanging tracks).

// Not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use jukebot_common::events::PlayerEvent;
use jukebot_common::{SessionKey, Track};
use jukebot_player::error::Result;
use jukebot_player::output::{AudioOutput, OutputEvent, OutputHandle};
use jukebot_player::resolve::{MediaResolver, Resolution, ResolveError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, timeout, Instant};

/// Resolver that serves fake artifacts, failing for scripted URLs.
pub struct ScriptedResolver {
    fail_urls: Mutex<HashSet<String>>,
    delay: Duration,
    fetches: AtomicU32,
    fetched_urls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail_urls: Mutex::new(HashSet::new()),
            delay,
            fetches: AtomicU32::new(0),
            fetched_urls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Every fetch of `url` will fail with `NotFound`.
    pub fn fail_url(&self, url: &str) {
        self.fail_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Distinct URLs fetched so far.
    pub fn fetched_urls(&self) -> HashSet<String> {
        self.fetched_urls.lock().unwrap().iter().cloned().collect()
    }

    /// Number of fetch attempts made for one URL.
    pub fn fetches_of(&self, url: &str) -> usize {
        self.fetched_urls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaResolver for ScriptedResolver {
    async fn resolve(
        &self,
        input: &str,
        requested_by: &str,
    ) -> std::result::Result<Resolution, ResolveError> {
        Ok(Resolution::SingleTrack(Track::new(
            input,
            format!("Resolved {}", input),
            Some(120),
            None,
            requested_by,
        )))
    }

    async fn fetch(
        &self,
        track: &Track,
        dest: &Path,
    ) -> std::result::Result<(), ResolveError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetched_urls
            .lock()
            .unwrap()
            .push(track.source_url.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_urls.lock().unwrap().contains(&track.source_url) {
            return Err(ResolveError::NotFound(track.source_url.clone()));
        }
        tokio::fs::write(dest, b"fake media")
            .await
            .map_err(|_| ResolveError::Unsupported("write failed".to_string()))
    }
}

/// How mock tracks end.
#[derive(Debug, Clone, Copy)]
pub enum TrackLength {
    /// Track completes on its own after this long
    Finite(Duration),
    /// Track never completes; the test must skip or stop it
    Endless,
}

/// Output that records every artifact it is handed.
pub struct MockOutput {
    length: TrackLength,
    begun: Mutex<Vec<PathBuf>>,
}

impl MockOutput {
    pub fn new(length: TrackLength) -> Arc<Self> {
        Arc::new(Self {
            length,
            begun: Mutex::new(Vec::new()),
        })
    }

    /// Artifacts handed to `begin`, in order.
    pub fn begun_artifacts(&self) -> Vec<PathBuf> {
        self.begun.lock().unwrap().clone()
    }
}

pub struct MockHandle {
    ends_at: Option<Instant>,
}

#[async_trait]
impl OutputHandle for MockHandle {
    async fn wait(&mut self) -> OutputEvent {
        match self.ends_at {
            // Deadline-based so restarts of this future don't extend the track
            Some(deadline) => {
                sleep_until(deadline).await;
                OutputEvent::Completed
            }
            None => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AudioOutput for MockOutput {
    async fn begin(
        &self,
        _session: SessionKey,
        artifact: &Path,
    ) -> Result<Box<dyn OutputHandle>> {
        self.begun.lock().unwrap().push(artifact.to_path_buf());
        let ends_at = match self.length {
            TrackLength::Finite(d) => Some(Instant::now() + d),
            TrackLength::Endless => None,
        };
        Ok(Box::new(MockHandle { ends_at }))
    }
}

/// Receive the next event, failing the test after 5 seconds.
pub async fn next_event(rx: &mut broadcast::Receiver<PlayerEvent>) -> PlayerEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for player event")
        .expect("event bus closed")
}

/// Skip events until one matches `pred`, failing the test after 5 seconds.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    mut pred: F,
) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

/// A track whose artifact would stream for `length`.
pub fn track(n: u8) -> Track {
    Track::new(
        format!("https://example.com/track/{}", n),
        format!("Track {}", n),
        Some(180),
        Some("Test Uploader".to_string()),
        "tester",
    )
}
