//! Player engine - per-session state machine and playback loop
//!
//! **Responsibilities:**
//! - Own the session's queue and buffer manager
//! - Drive the playback loop: wait for the head artifact, hand it to the
//!   audio output, advance on completion, skip past permanent failures
//! - Observe commands (skip/pause/resume/stop/jump) at suspension points
//!
//! The loop task is the only writer of the player state and the only
//! caller of `advance`/`skip_to`/`clear` for its queue; this single-writer
//! rule is what keeps the state machine race-free while commands arrive
//! concurrently.

use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::output::{AudioOutput, OutputEvent};
use crate::playback::buffer_manager::BufferManager;
use crate::playback::queue::{LoopMode, PlaybackQueue};
use crate::resolve::MediaResolver;
use jukebot_common::events::{DownloadStatus, EventBus, PlaybackState, PlayerEvent};
use jukebot_common::track::Track;
use jukebot_common::SessionKey;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Requests posted to the loop; observed at its next suspension point.
#[derive(Debug)]
enum PlayerCommand {
    /// New work was enqueued; re-check the queue and prefetch window
    Wake,
    Skip,
    Pause,
    Resume,
    Stop,
    SkipTo(usize),
}

/// Read-only view of one queue entry for display.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntryInfo {
    pub track_id: Uuid,
    pub title: String,
    pub duration: String,
    pub requested_by: String,
    pub status: DownloadStatus,
}

/// Read-only view of a session's queue and state for display.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub session: SessionKey,
    pub state: PlaybackState,
    pub loop_mode: LoopMode,
    pub cursor: Option<usize>,
    pub entries: Vec<QueueEntryInfo>,
}

/// Per-session player handle.
///
/// Created by the session registry; the loop task it spawns keeps running
/// until `stop`/`shutdown` or a transport failure.
pub struct Player {
    session: SessionKey,
    queue: Arc<Mutex<PlaybackQueue>>,
    buffers: BufferManager,
    state: Arc<RwLock<PlaybackState>>,
    events: EventBus,
    cmd_tx: mpsc::UnboundedSender<PlayerCommand>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Create a player and start its loop task.
    pub fn spawn(
        session: SessionKey,
        config: &PlayerConfig,
        resolver: Arc<dyn MediaResolver>,
        output: Arc<dyn AudioOutput>,
        events: EventBus,
    ) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(PlaybackQueue::new()));
        let buffers = BufferManager::new(session, config, resolver);
        let state = Arc::new(RwLock::new(PlaybackState::Idle));

        let player_loop = PlayerLoop {
            session,
            queue: Arc::clone(&queue),
            buffers: buffers.clone(),
            output,
            state: Arc::clone(&state),
            events: events.clone(),
            cmd_rx,
            lookahead: config.lookahead,
            max_consecutive_failures: config.max_consecutive_failures,
            consecutive_failures: 0,
        };
        let handle = tokio::spawn(player_loop.run());

        Arc::new(Self {
            session,
            queue,
            buffers,
            state,
            events,
            cmd_tx,
            loop_task: Mutex::new(Some(handle)),
        })
    }

    pub fn session(&self) -> SessionKey {
        self.session
    }

    /// Current state machine state.
    pub async fn state(&self) -> PlaybackState {
        *self.state.read().await
    }

    /// Subscribe to this process's player events (all sessions).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn send(&self, cmd: PlayerCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::InvalidState("player is stopped".to_string()))
    }

    /// Append a resolved track to the queue and wake the loop.
    pub async fn enqueue(&self, track: Track) -> Result<Arc<Track>> {
        if self.cmd_tx.is_closed() {
            return Err(Error::InvalidState("player is stopped".to_string()));
        }
        let track = Arc::new(track);
        {
            let mut queue = self.queue.lock().await;
            queue.add(Arc::clone(&track));
            debug!(
                "Session {}: enqueued {} at position {}",
                self.session,
                track.title,
                queue.len() - 1
            );
        }
        self.send(PlayerCommand::Wake)?;
        Ok(track)
    }

    /// Skip the current track.
    pub async fn skip(&self) -> Result<()> {
        match self.state().await {
            PlaybackState::Preparing
            | PlaybackState::Playing
            | PlaybackState::Paused
            | PlaybackState::Skipping => self.send(PlayerCommand::Skip),
            other => Err(Error::InvalidState(format!(
                "nothing to skip while {}",
                other
            ))),
        }
    }

    /// Pause output. Only valid while playing.
    pub async fn pause(&self) -> Result<()> {
        match self.state().await {
            PlaybackState::Playing => self.send(PlayerCommand::Pause),
            other => Err(Error::InvalidState(format!("cannot pause while {}", other))),
        }
    }

    /// Resume paused output.
    pub async fn resume(&self) -> Result<()> {
        match self.state().await {
            PlaybackState::Paused => self.send(PlayerCommand::Resume),
            other => Err(Error::InvalidState(format!(
                "cannot resume while {}",
                other
            ))),
        }
    }

    /// Stop playback, clear the queue, release all session resources.
    /// Idempotent; stopping a stopped player is a no-op.
    pub fn stop(&self) -> Result<()> {
        let _ = self.cmd_tx.send(PlayerCommand::Stop);
        Ok(())
    }

    /// Jump the cursor to `index`. Rejected with `OutOfRange` without
    /// touching the queue; a no-op on an empty queue.
    pub async fn skip_to(&self, index: usize) -> Result<()> {
        {
            let queue = self.queue.lock().await;
            if queue.is_empty() {
                return Ok(());
            }
            if index >= queue.len() {
                return Err(Error::OutOfRange {
                    index,
                    len: queue.len(),
                });
            }
        }
        self.send(PlayerCommand::SkipTo(index))
    }

    /// Change the loop mode. Pure queue-state change, no effect on
    /// existing entries or the running track.
    pub async fn set_loop_mode(&self, mode: LoopMode) {
        self.queue.lock().await.set_loop_mode(mode);
        debug!("Session {}: loop mode set to {}", self.session, mode);
    }

    /// Read-only snapshot of queue and state for display.
    pub async fn snapshot(&self) -> PlayerSnapshot {
        let statuses = self.buffers.all_statuses().await;
        let queue = self.queue.lock().await;
        let entries = queue
            .entries()
            .iter()
            .map(|t| QueueEntryInfo {
                track_id: t.id,
                title: t.title.clone(),
                duration: t.duration_display(),
                requested_by: t.requested_by.clone(),
                status: statuses
                    .get(&t.id)
                    .copied()
                    .unwrap_or(DownloadStatus::Pending),
            })
            .collect();

        PlayerSnapshot {
            session: self.session,
            state: *self.state.read().await,
            loop_mode: queue.loop_mode(),
            cursor: queue.cursor(),
            entries,
        }
    }

    /// Stop the session and wait for its loop task to exit.
    pub async fn shutdown(&self) {
        let _ = self.stop();
        let handle = self.loop_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Session {}: loop task panicked: {}", self.session, e);
                }
            }
        }
    }
}

/// Outcome of waiting for the head track's artifact.
enum Prepared {
    Artifact(PathBuf),
    Failed(Error),
    Skipped,
    Jump(usize),
    Stop,
}

/// Terminal outcome of one play phase.
enum PlayEnd {
    Output(OutputEvent),
    Skipped,
    Jump(usize),
    Stop,
}

/// State owned by the loop task.
struct PlayerLoop {
    session: SessionKey,
    queue: Arc<Mutex<PlaybackQueue>>,
    buffers: BufferManager,
    output: Arc<dyn AudioOutput>,
    state: Arc<RwLock<PlaybackState>>,
    events: EventBus,
    cmd_rx: mpsc::UnboundedReceiver<PlayerCommand>,
    lookahead: usize,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
}

impl PlayerLoop {
    async fn run(mut self) {
        info!("Session {}: player loop started", self.session);

        loop {
            let head = { self.queue.lock().await.current() };
            let Some(track) = head else {
                if !self.idle_wait().await {
                    break;
                }
                continue;
            };

            match self.prepare(&track).await {
                Prepared::Artifact(artifact) => {
                    self.consecutive_failures = 0;
                    if !self.play(&track, &artifact).await {
                        break;
                    }
                }
                Prepared::Failed(err) => self.handle_track_failure(&track, err).await,
                Prepared::Skipped => self.finish_track(&track, true).await,
                Prepared::Jump(index) => self.jump_to(index, Some(&track)).await,
                Prepared::Stop => {
                    self.teardown().await;
                    break;
                }
            }
        }

        info!("Session {}: player loop exited", self.session);
    }

    /// Idle state: wait for work. Returns false when the loop should exit.
    async fn idle_wait(&mut self) -> bool {
        self.set_state(PlaybackState::Idle).await;

        loop {
            match self.cmd_rx.recv().await {
                None => return false,
                Some(PlayerCommand::Stop) => {
                    self.teardown().await;
                    return false;
                }
                Some(PlayerCommand::Wake) => return true,
                Some(PlayerCommand::SkipTo(index)) => {
                    self.jump_to(index, None).await;
                    return true;
                }
                Some(cmd) => {
                    debug!("Session {}: ignoring {:?} while idle", self.session, cmd);
                }
            }
        }
    }

    /// Preparing state: wait for the head artifact, observing commands.
    async fn prepare(&mut self, track: &Arc<Track>) -> Prepared {
        self.set_state(PlaybackState::Preparing).await;
        self.prefetch_window().await;

        let buffers = self.buffers.clone();
        let ensure = buffers.ensure_ready(track);
        tokio::pin!(ensure);

        loop {
            tokio::select! {
                res = &mut ensure => {
                    return match res {
                        Ok(path) => Prepared::Artifact(path),
                        Err(err) => Prepared::Failed(err),
                    };
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(PlayerCommand::Stop) => return Prepared::Stop,
                    Some(PlayerCommand::Skip) => {
                        self.set_state(PlaybackState::Skipping).await;
                        return Prepared::Skipped;
                    }
                    Some(PlayerCommand::SkipTo(index)) => return Prepared::Jump(index),
                    Some(PlayerCommand::Wake) => self.prefetch_window().await,
                    Some(cmd) => {
                        debug!(
                            "Session {}: ignoring {:?} while preparing",
                            self.session, cmd
                        );
                    }
                }
            }
        }
    }

    /// Playing/Paused states. Returns false when the loop should exit.
    async fn play(&mut self, track: &Arc<Track>, artifact: &Path) -> bool {
        let mut handle = match self.output.begin(self.session, artifact).await {
            Ok(handle) => handle,
            Err(e) => return self.transport_failure(&e.to_string()).await,
        };

        self.set_state(PlaybackState::Playing).await;
        self.events.emit_lossy(PlayerEvent::TrackStarted {
            session: self.session,
            track: (**track).clone(),
            timestamp: chrono::Utc::now(),
        });
        info!("Session {}: now playing {}", self.session, track.title);

        let end = loop {
            tokio::select! {
                event = handle.wait() => break PlayEnd::Output(event),
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(PlayerCommand::Stop) => {
                        let _ = handle.stop().await;
                        break PlayEnd::Stop;
                    }
                    Some(PlayerCommand::Skip) => {
                        self.set_state(PlaybackState::Skipping).await;
                        let _ = handle.stop().await;
                        break PlayEnd::Skipped;
                    }
                    Some(PlayerCommand::SkipTo(index)) => {
                        let _ = handle.stop().await;
                        break PlayEnd::Jump(index);
                    }
                    Some(PlayerCommand::Pause) => {
                        if *self.state.read().await == PlaybackState::Playing {
                            match handle.pause().await {
                                Ok(()) => self.set_state(PlaybackState::Paused).await,
                                Err(e) => warn!("Session {}: pause failed: {}", self.session, e),
                            }
                        }
                    }
                    Some(PlayerCommand::Resume) => {
                        if *self.state.read().await == PlaybackState::Paused {
                            match handle.resume().await {
                                Ok(()) => self.set_state(PlaybackState::Playing).await,
                                Err(e) => warn!("Session {}: resume failed: {}", self.session, e),
                            }
                        }
                    }
                    Some(PlayerCommand::Wake) => self.prefetch_window().await,
                }
            }
        };

        match end {
            PlayEnd::Output(OutputEvent::Completed) => {
                self.finish_track(track, false).await;
                true
            }
            PlayEnd::Output(OutputEvent::Stopped) => {
                // Output halted without a command from us: the transport
                // was torn down underneath (forced disconnect)
                info!(
                    "Session {}: output stopped externally, stopping session",
                    self.session
                );
                self.teardown().await;
                false
            }
            PlayEnd::Output(OutputEvent::Error(msg)) => self.transport_failure(&msg).await,
            PlayEnd::Skipped => {
                self.finish_track(track, true).await;
                true
            }
            PlayEnd::Jump(index) => {
                self.jump_to(index, Some(track)).await;
                true
            }
            PlayEnd::Stop => {
                self.teardown().await;
                false
            }
        }
    }

    /// A track's artifact finished serving (natural end or skip): release
    /// it, record the completion, and move the cursor.
    async fn finish_track(&mut self, track: &Arc<Track>, skipped: bool) {
        // Single-repeat replays reuse the artifact until something else
        // evicts it; every other case releases it now.
        let loop_mode = { self.queue.lock().await.loop_mode() };
        if skipped || loop_mode != LoopMode::Single {
            self.buffers.evict(track.id).await;
        }

        self.events.emit_lossy(PlayerEvent::TrackCompleted {
            session: self.session,
            track_id: track.id,
            title: track.title.clone(),
            skipped,
            timestamp: chrono::Utc::now(),
        });

        {
            self.queue.lock().await.advance();
        }
        self.cleanup_after_move().await;
    }

    /// Permanently-failed track: report it, evict, advance, and force the
    /// session Idle when the whole queue is failing.
    async fn handle_track_failure(&mut self, track: &Arc<Track>, err: Error) {
        warn!(
            "Session {}: track {} ({}) is unplayable: {}",
            self.session, track.title, track.id, err
        );
        self.events.emit_lossy(PlayerEvent::TrackFailed {
            session: self.session,
            track_id: track.id,
            title: track.title.clone(),
            source_url: track.source_url.clone(),
            error: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.buffers.evict(track.id).await;
        self.consecutive_failures += 1;

        let exhausted = {
            let mut queue = self.queue.lock().await;
            let len = queue.len() as u32;
            // Bounded by queue length per pass, plus the session-level cap,
            // so an all-failed queue cannot spin forever
            let exhausted = self.consecutive_failures >= len
                || self.consecutive_failures >= self.max_consecutive_failures;
            if !exhausted {
                queue.advance();
            }
            exhausted
        };

        if exhausted {
            warn!(
                "Session {}: queue exhausted after {} consecutive failures",
                self.session, self.consecutive_failures
            );
            let drained = { self.queue.lock().await.clear() };
            for entry in &drained {
                self.buffers.evict(entry.id).await;
            }
            self.buffers.cleanup_stale(&[], &[]).await;
            self.events.emit_lossy(PlayerEvent::QueueExhausted {
                session: self.session,
                consecutive_failures: self.consecutive_failures,
                timestamp: chrono::Utc::now(),
            });
            self.consecutive_failures = 0;
            // Loop returns to Idle on the next iteration
        } else {
            self.cleanup_after_move().await;
        }
    }

    /// Jump the cursor. `abandoned` is a head track whose preparation or
    /// playback was interrupted; evicting it also releases any claim an
    /// abandoned `ensure_ready` left behind.
    async fn jump_to(&mut self, index: usize, abandoned: Option<&Arc<Track>>) {
        if let Some(track) = abandoned {
            self.buffers.evict(track.id).await;
        }

        let result = { self.queue.lock().await.skip_to(index) };
        match result {
            Ok(Some(track)) => debug!(
                "Session {}: jumped to {} at index {}",
                self.session, track.title, index
            ),
            Ok(None) => {}
            // Queue shrank between validation and application; nothing moved
            Err(e) => warn!("Session {}: stale jump request: {}", self.session, e),
        }
        self.cleanup_after_move().await;
    }

    /// Release artifacts that the last cursor move left behind.
    async fn cleanup_after_move(&self) {
        let (live, behind) = {
            let queue = self.queue.lock().await;
            (queue.track_ids(), queue.behind_cursor_ids())
        };
        self.buffers.cleanup_stale(&live, &behind).await;
    }

    async fn prefetch_window(&self) {
        let window = { self.queue.lock().await.lookahead(self.lookahead) };
        self.buffers.prefetch(&window).await;
    }

    /// Unrecoverable output failure: surface Error, then stop the session.
    async fn transport_failure(&mut self, msg: &str) -> bool {
        error!("Session {}: transport failure: {}", self.session, msg);
        self.set_state(PlaybackState::Error).await;
        self.teardown().await;
        false
    }

    /// Stop: clear the queue, release every artifact and the scratch
    /// folder, cancel prefetch work.
    async fn teardown(&mut self) {
        {
            self.queue.lock().await.clear();
        }
        self.buffers.shutdown().await;
        self.set_state(PlaybackState::Stopped).await;
        self.events.emit_lossy(PlayerEvent::SessionStopped {
            session: self.session,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn set_state(&self, new_state: PlaybackState) {
        let old_state = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, new_state)
        };
        if old_state != new_state {
            debug!(
                "Session {}: state {} -> {}",
                self.session, old_state, new_state
            );
            self.events.emit_lossy(PlayerEvent::StateChanged {
                session: self.session,
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputHandle;
    use crate::resolve::{MediaResolver, Resolution, ResolveError};
    use async_trait::async_trait;

    struct InstantResolver;

    #[async_trait]
    impl MediaResolver for InstantResolver {
        async fn resolve(
            &self,
            input: &str,
            _requested_by: &str,
        ) -> std::result::Result<Resolution, ResolveError> {
            Err(ResolveError::Unsupported(input.to_string()))
        }

        async fn fetch(
            &self,
            _track: &Track,
            dest: &Path,
        ) -> std::result::Result<(), ResolveError> {
            tokio::fs::write(dest, b"media")
                .await
                .map_err(|_| ResolveError::Unsupported("write".to_string()))
        }
    }

    /// Output whose tracks never finish on their own
    struct HangingOutput;

    struct HangingHandle;

    #[async_trait]
    impl OutputHandle for HangingHandle {
        async fn wait(&mut self) -> OutputEvent {
            futures::future::pending::<()>().await;
            OutputEvent::Completed
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
    impl AudioOutput for HangingOutput {
        async fn begin(
            &self,
            _session: SessionKey,
            _artifact: &Path,
        ) -> Result<Box<dyn OutputHandle>> {
            Ok(Box::new(HangingHandle))
        }
    }

    fn test_player(scratch: &Path) -> Arc<Player> {
        let config = PlayerConfig {
            scratch_dir: Some(scratch.to_path_buf()),
            ..PlayerConfig::default()
        };
        Player::spawn(
            1,
            &config,
            Arc::new(InstantResolver),
            Arc::new(HangingOutput),
            EventBus::new(100),
        )
    }

    fn test_track(n: u8) -> Track {
        Track::new(
            format!("https://example.com/{}", n),
            format!("Track {}", n),
            Some(30),
            None,
            "tester",
        )
    }

    #[tokio::test]
    async fn test_player_starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let player = test_player(dir.path());
        assert_eq!(player.state().await, PlaybackState::Idle);
        player.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_while_idle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let player = test_player(dir.path());

        assert!(matches!(
            player.pause().await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(player.skip().await, Err(Error::InvalidState(_))));
        assert_eq!(player.state().await, PlaybackState::Idle);
        player.shutdown().await;
    }

    #[tokio::test]
    async fn test_skip_to_out_of_range_rejected_locally() {
        let dir = tempfile::tempdir().unwrap();
        let player = test_player(dir.path());

        // Empty queue: no-op
        player.skip_to(0).await.unwrap();

        player.enqueue(test_track(1)).await.unwrap();
        let err = player.skip_to(5).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange { index: 5, len: 1 }));
        player.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let player = test_player(dir.path());
        player.shutdown().await;

        let err = player.enqueue(test_track(1)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        // Stopping again stays a no-op
        player.stop().unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_reflects_queue() {
        let dir = tempfile::tempdir().unwrap();
        let player = test_player(dir.path());

        player.enqueue(test_track(1)).await.unwrap();
        player.enqueue(test_track(2)).await.unwrap();
        player.set_loop_mode(LoopMode::All).await;

        let snapshot = player.snapshot().await;
        assert_eq!(snapshot.session, 1);
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.loop_mode, LoopMode::All);
        assert_eq!(snapshot.entries[0].title, "Track 1");
        player.shutdown().await;
    }
}
