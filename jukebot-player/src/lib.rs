//! # Jukebot Player
//!
//! Per-session playback engine for a chat-platform audio bot:
//! - [`playback::PlaybackQueue`]: ordered tracks, cursor, loop modes
//! - [`playback::BufferManager`]: bounded prefetch of track artifacts with
//!   retry, timeout, and eviction
//! - [`playback::Player`]: per-session state machine driving queue and
//!   buffers from a single loop task
//! - [`SessionRegistry`]: process-wide session map
//! - [`resolve::MediaResolver`] / [`output::AudioOutput`]: contracts for
//!   the source-site and voice-transport collaborators, which live in the
//!   embedding application
//!
//! ## Typical embedding
//!
//! ```no_run
//! use std::sync::Arc;
//! use jukebot_player::{PlayerConfig, SessionRegistry};
//! # use std::path::Path;
//! # use async_trait::async_trait;
//! # use jukebot_common::{SessionKey, Track};
//! # use jukebot_player::resolve::{MediaResolver, Resolution, ResolveError};
//! # use jukebot_player::output::{AudioOutput, OutputHandle};
//! # struct MyResolver;
//! # #[async_trait]
//! # impl MediaResolver for MyResolver {
//! #     async fn resolve(&self, i: &str, _r: &str) -> Result<Resolution, ResolveError> {
//! #         Err(ResolveError::Unsupported(i.into()))
//! #     }
//! #     async fn fetch(&self, _t: &Track, _d: &Path) -> Result<(), ResolveError> { Ok(()) }
//! # }
//! # struct MyOutput;
//! # #[async_trait]
//! # impl AudioOutput for MyOutput {
//! #     async fn begin(&self, _s: SessionKey, _a: &Path)
//! #         -> jukebot_player::Result<Box<dyn OutputHandle>> { unimplemented!() }
//! # }
//!
//! # async fn run() -> jukebot_player::Result<()> {
//! let registry = SessionRegistry::new(
//!     PlayerConfig::default(),
//!     Arc::new(MyResolver),
//!     Arc::new(MyOutput),
//! );
//!
//! let player = registry.get_or_create(1).await;
//! let track = Track::new("https://example.com/song", "Song", Some(180), None, "alice");
//! player.enqueue(track).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod playback;
pub mod registry;
pub mod resolve;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use playback::{BufferManager, LoopMode, PlaybackQueue, Player, PlayerSnapshot};
pub use registry::SessionRegistry;
