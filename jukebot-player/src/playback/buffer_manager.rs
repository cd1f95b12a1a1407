//! Buffer manager
//!
//! Keeps up to N upcoming tracks either downloading or ready on disk,
//! bounds concurrent downloads to N per session, and reclaims artifacts
//! once a track has been consumed or dropped from the queue.
//!
//! Per-track readiness is signalled through a `watch` channel, so the
//! player loop awaits the head track while prefetch tasks fill the rest
//! of the window in the background.

use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::resolve::{MediaResolver, ResolveError};
use jukebot_common::events::DownloadStatus;
use jukebot_common::track::Track;
use jukebot_common::SessionKey;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Download bookkeeping for one track
struct ManagedDownload {
    track: Arc<Track>,

    /// Current download status
    status: DownloadStatus,

    /// Local artifact path, set only when status is Ready
    artifact: Option<PathBuf>,

    /// Fetch attempts so far (exhausted once attempts > retry budget)
    attempts: u32,

    /// A task owns this download (claimed before the permit is acquired,
    /// so waiters never start a duplicate fetch)
    claimed: bool,

    /// Status change notifications for waiters
    notify: watch::Sender<DownloadStatus>,
}

impl ManagedDownload {
    fn new(track: Arc<Track>) -> Self {
        let (notify, _) = watch::channel(DownloadStatus::Pending);
        Self {
            track,
            status: DownloadStatus::Pending,
            artifact: None,
            attempts: 0,
            claimed: false,
            notify,
        }
    }

    fn set_status(&mut self, status: DownloadStatus) {
        self.status = status;
        self.notify.send_replace(status);
    }
}

/// Next step for an `ensure_ready` caller, decided under the table lock
enum Step {
    Artifact(PathBuf),
    Exhausted(u32),
    Wait(watch::Receiver<DownloadStatus>),
    Fetch,
}

/// Per-session download window and artifact storage.
///
/// Cheap to clone; all state is shared behind `Arc`s.
#[derive(Clone)]
pub struct BufferManager {
    session: SessionKey,

    /// Session-private scratch folder; removed wholesale on shutdown
    scratch_dir: PathBuf,

    resolver: Arc<dyn MediaResolver>,

    retry_budget: u32,
    fetch_timeout: Duration,

    /// Track id -> download bookkeeping
    downloads: Arc<RwLock<HashMap<Uuid, ManagedDownload>>>,

    /// Bounds concurrent fetches to the lookahead window size
    permits: Arc<Semaphore>,

    /// Detached prefetch tasks, aborted on shutdown
    prefetch_tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BufferManager {
    /// Create a buffer manager for one session.
    pub fn new(session: SessionKey, config: &PlayerConfig, resolver: Arc<dyn MediaResolver>) -> Self {
        Self {
            session,
            scratch_dir: config.scratch_dir().join(session.to_string()),
            resolver,
            retry_budget: config.retry_budget,
            fetch_timeout: config.fetch_timeout(),
            downloads: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(config.lookahead)),
            prefetch_tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Wait until the track's artifact is ready and return its path.
    ///
    /// Starts the download if nobody has; joins an in-flight download
    /// otherwise. Internally retries failed fetches until the budget is
    /// spent, then returns [`Error::ResolutionExhausted`]; that failure is
    /// permanent for the rest of the session. An evicted artifact is
    /// re-downloaded from scratch with a fresh retry budget.
    pub async fn ensure_ready(&self, track: &Arc<Track>) -> Result<PathBuf> {
        let mut first = true;
        loop {
            let step = {
                let mut downloads = self.downloads.write().await;
                let entry = if first {
                    first = false;
                    downloads
                        .entry(track.id)
                        .or_insert_with(|| ManagedDownload::new(Arc::clone(track)))
                } else {
                    // The entry may have been dropped by cleanup while we
                    // waited or fetched; the track left the queue, so give
                    // up rather than re-insert with a fresh retry budget.
                    match downloads.get_mut(&track.id) {
                        Some(entry) => entry,
                        None => {
                            return Err(Error::Internal(format!(
                                "download for {} was discarded",
                                track.id
                            )))
                        }
                    }
                };

                if entry.claimed {
                    Step::Wait(entry.notify.subscribe())
                } else {
                    match entry.status {
                        DownloadStatus::Ready => match entry.artifact.clone() {
                            Some(path) => Step::Artifact(path),
                            None => {
                                // Artifact lost out from under us; start over
                                entry.set_status(DownloadStatus::Pending);
                                entry.claimed = true;
                                Step::Fetch
                            }
                        },
                        DownloadStatus::Downloading => Step::Wait(entry.notify.subscribe()),
                        DownloadStatus::Failed if entry.attempts > self.retry_budget => {
                            Step::Exhausted(entry.attempts)
                        }
                        DownloadStatus::Evicted => {
                            entry.attempts = 0;
                            entry.set_status(DownloadStatus::Pending);
                            entry.claimed = true;
                            Step::Fetch
                        }
                        DownloadStatus::Pending | DownloadStatus::Failed => {
                            entry.claimed = true;
                            Step::Fetch
                        }
                    }
                }
            };

            match step {
                Step::Artifact(path) => return Ok(path),
                Step::Exhausted(attempts) => {
                    return Err(Error::ResolutionExhausted {
                        track_id: track.id,
                        attempts,
                    })
                }
                Step::Wait(mut rx) => {
                    // A change (or the entry being dropped by cleanup) sends
                    // us back around the loop to re-examine the table.
                    let _ = rx.changed().await;
                }
                Step::Fetch => self.fetch_once(track).await,
            }
        }
    }

    /// Run one fetch attempt for a claimed download.
    async fn fetch_once(&self, track: &Arc<Track>) {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed during shutdown
        };

        // Enter Downloading only while holding a permit, and only if the
        // claim survived the wait (eviction/cleanup may have intervened).
        {
            let mut downloads = self.downloads.write().await;
            match downloads.get_mut(&track.id) {
                Some(entry) if entry.claimed => entry.set_status(DownloadStatus::Downloading),
                _ => return,
            }
        }

        let dest = self.scratch_dir.join(format!("{}.media", track.id));
        let result = match tokio::fs::create_dir_all(&self.scratch_dir).await {
            Ok(()) => match timeout(self.fetch_timeout, self.resolver.fetch(track, &dest)).await {
                Ok(inner) => inner,
                Err(_) => Err(ResolveError::Timeout),
            },
            Err(e) => {
                warn!(
                    "Session {}: cannot create scratch dir {}: {}",
                    self.session,
                    self.scratch_dir.display(),
                    e
                );
                Err(ResolveError::Unsupported(format!("scratch dir: {}", e)))
            }
        };

        let mut downloads = self.downloads.write().await;
        let Some(entry) = downloads.get_mut(&track.id) else {
            // Dropped by cleanup while fetching; discard any partial file
            drop(downloads);
            let _ = tokio::fs::remove_file(&dest).await;
            return;
        };

        if entry.status != DownloadStatus::Downloading {
            // Evicted mid-fetch; the artifact is unwanted
            drop(downloads);
            let _ = tokio::fs::remove_file(&dest).await;
            return;
        }

        entry.claimed = false;
        match result {
            Ok(()) => {
                debug!(
                    "Session {}: artifact ready for {} ({})",
                    self.session, track.title, track.id
                );
                entry.artifact = Some(dest);
                entry.set_status(DownloadStatus::Ready);
            }
            Err(e) => {
                entry.attempts += 1;
                entry.set_status(DownloadStatus::Failed);
                warn!(
                    "Session {}: fetch attempt {} failed for {} ({}): {}",
                    self.session, entry.attempts, track.title, track.id, e
                );
            }
        }
    }

    /// Start best-effort background downloads for the lookahead window.
    ///
    /// Never blocks on a fetch, never duplicates in-flight work; the
    /// permit semaphore keeps at most N downloads running.
    pub async fn prefetch(&self, window: &[Arc<Track>]) {
        let mut tasks = self.prefetch_tasks.lock().await;

        // Reap finished tasks so the set doesn't grow unbounded
        while tasks.try_join_next().is_some() {}

        for track in window {
            if !self.wants_fetch(track.id).await {
                continue;
            }
            let manager = self.clone();
            let track = Arc::clone(track);
            tasks.spawn(async move {
                if let Err(e) = manager.ensure_ready(&track).await {
                    debug!("Prefetch gave up on {} ({}): {}", track.title, track.id, e);
                }
            });
        }
    }

    /// Whether prefetch should start work for this track.
    async fn wants_fetch(&self, track_id: Uuid) -> bool {
        let downloads = self.downloads.read().await;
        match downloads.get(&track_id) {
            None => true,
            Some(entry) => {
                if entry.claimed {
                    return false;
                }
                match entry.status {
                    DownloadStatus::Downloading | DownloadStatus::Ready => false,
                    DownloadStatus::Failed => entry.attempts <= self.retry_budget,
                    DownloadStatus::Pending | DownloadStatus::Evicted => true,
                }
            }
        }
    }

    /// Release a track's artifact and delete its local storage.
    ///
    /// Idempotent: evicting an evicted or never-downloaded track is a
    /// no-op, and a spent retry budget survives eviction (the track stays
    /// permanently `Failed`). Returns true when an artifact file was
    /// actually released.
    pub async fn evict(&self, track_id: Uuid) -> bool {
        let artifact = {
            let mut downloads = self.downloads.write().await;
            let Some(entry) = downloads.get_mut(&track_id) else {
                return false;
            };
            match entry.status {
                DownloadStatus::Evicted => return false,
                // Failure state is kept so the track is never re-fetched
                // once its budget is spent; there is no artifact to release
                DownloadStatus::Failed => {
                    entry.claimed = false;
                    return false;
                }
                // Nothing fetched yet; just release any abandoned claim so
                // waiters re-examine the table
                DownloadStatus::Pending => {
                    if entry.claimed {
                        entry.claimed = false;
                        entry.notify.send_replace(entry.status);
                    }
                    return false;
                }
                DownloadStatus::Downloading | DownloadStatus::Ready => {
                    entry.claimed = false;
                    entry.set_status(DownloadStatus::Evicted);
                    entry.artifact.take()
                }
            }
        };

        match artifact {
            Some(path) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Session {}: failed to delete {}: {}", self.session, path.display(), e);
                    }
                }
                debug!("Session {}: evicted artifact for {}", self.session, track_id);
                true
            }
            None => false,
        }
    }

    /// Drop tracking for downloads that no longer belong to the queue and
    /// evict artifacts that have fallen behind the cursor.
    ///
    /// `live_ids` is the full set of queue entries; `behind_ids` are the
    /// entries more than one slot behind the cursor.
    pub async fn cleanup_stale(&self, live_ids: &[Uuid], behind_ids: &[Uuid]) {
        let live: HashSet<Uuid> = live_ids.iter().copied().collect();

        let stale: Vec<(Uuid, Option<PathBuf>)> = {
            let mut downloads = self.downloads.write().await;
            let ids: Vec<Uuid> = downloads
                .keys()
                .filter(|id| !live.contains(id))
                .copied()
                .collect();
            ids.into_iter()
                .filter_map(|id| downloads.remove(&id).map(|e| (id, e.artifact)))
                .collect()
        };

        for (id, artifact) in stale {
            if let Some(path) = artifact {
                let _ = tokio::fs::remove_file(&path).await;
            }
            debug!("Session {}: dropped stale download {}", self.session, id);
        }

        for id in behind_ids {
            self.evict(*id).await;
        }
    }

    /// Abort prefetch work and remove the session's scratch folder,
    /// including partial artifacts of cancelled fetches.
    pub async fn shutdown(&self) {
        {
            let mut tasks = self.prefetch_tasks.lock().await;
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        self.downloads.write().await.clear();

        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Session {}: failed to remove scratch dir {}: {}",
                    self.session,
                    self.scratch_dir.display(),
                    e
                );
            }
        }
        debug!("Session {}: buffer manager shut down", self.session);
    }

    /// Download status of one track, if tracked.
    pub async fn status(&self, track_id: Uuid) -> Option<DownloadStatus> {
        self.downloads.read().await.get(&track_id).map(|e| e.status)
    }

    /// Snapshot of every tracked download.
    pub async fn all_statuses(&self) -> HashMap<Uuid, DownloadStatus> {
        self.downloads
            .read()
            .await
            .iter()
            .map(|(id, e)| (*id, e.status))
            .collect()
    }

    /// Number of downloads currently holding a permit.
    pub async fn downloading_count(&self) -> usize {
        self.downloads
            .read()
            .await
            .values()
            .filter(|e| e.status == DownloadStatus::Downloading)
            .count()
    }
}
