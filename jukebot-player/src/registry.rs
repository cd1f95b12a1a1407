//! Session registry
//!
//! Process-wide map from session key to its [`Player`]. Sessions are
//! created lazily on first use and fully torn down on removal; two
//! sessions never share queue, buffers, or scratch space.

use crate::config::PlayerConfig;
use crate::output::AudioOutput;
use crate::playback::Player;
use crate::resolve::MediaResolver;
use jukebot_common::events::EventBus;
use jukebot_common::SessionKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Owns every live session's player.
///
/// The registry holds the process-wide collaborators (resolver, output,
/// event bus, config) and clones them into each player it creates.
pub struct SessionRegistry {
    config: PlayerConfig,
    resolver: Arc<dyn MediaResolver>,
    output: Arc<dyn AudioOutput>,
    events: EventBus,
    players: RwLock<HashMap<SessionKey, Arc<Player>>>,
}

impl SessionRegistry {
    pub fn new(
        config: PlayerConfig,
        resolver: Arc<dyn MediaResolver>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            resolver,
            output,
            events,
            players: RwLock::new(HashMap::new()),
        }
    }

    /// Shared event bus; all sessions emit onto it.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Player for `session`, creating one if none exists.
    pub async fn get_or_create(&self, session: SessionKey) -> Arc<Player> {
        {
            let players = self.players.read().await;
            if let Some(player) = players.get(&session) {
                return Arc::clone(player);
            }
        }

        let mut players = self.players.write().await;
        // Re-check under the write lock; another task may have won the race
        if let Some(player) = players.get(&session) {
            return Arc::clone(player);
        }

        info!("Creating player for session {}", session);
        let player = Player::spawn(
            session,
            &self.config,
            Arc::clone(&self.resolver),
            Arc::clone(&self.output),
            self.events.clone(),
        );
        players.insert(session, Arc::clone(&player));
        player
    }

    /// Player for `session`, or None if the session has never played.
    pub async fn get(&self, session: SessionKey) -> Option<Arc<Player>> {
        self.players.read().await.get(&session).map(Arc::clone)
    }

    /// Stop and drop a session's player. A no-op for unknown sessions.
    pub async fn remove(&self, session: SessionKey) {
        let player = self.players.write().await.remove(&session);
        if let Some(player) = player {
            info!("Removing player for session {}", session);
            player.shutdown().await;
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.players.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.players.read().await.is_empty()
    }

    /// Stop every session. Called on process shutdown.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = {
            let mut players = self.players.write().await;
            players.drain().collect()
        };
        for (session, player) in drained {
            info!("Shutting down session {}", session);
            player.shutdown().await;
        }
    }
}
