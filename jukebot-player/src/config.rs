//! Player configuration
//!
//! Static configuration loaded once by the embedding application, either
//! from a TOML file or built in code. All fields have built-in defaults;
//! a missing config file means defaults throughout.

use crate::error::{Error, Result};
use jukebot_common::config::resolve_scratch_dir;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Per-process player configuration, shared by every session.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    /// Lookahead window N: queue entries at cursor..cursor+N-1 are eligible
    /// for prefetch, and at most N downloads run concurrently per session.
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,

    /// Retries allowed per track after the first failed fetch attempt.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Deadline for a single fetch attempt, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Consecutive permanent track failures tolerated before a session is
    /// forced back to Idle instead of spinning through a failing queue.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Scratch folder for downloaded artifacts (optional; resolved via
    /// environment / OS default when absent).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Event bus buffer size per subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_lookahead() -> usize {
    3
}

fn default_retry_budget() -> u32 {
    2
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_event_capacity() -> usize {
    100
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            lookahead: default_lookahead(),
            retry_budget: default_retry_budget(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_consecutive_failures: default_max_consecutive_failures(),
            scratch_dir: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: PlayerConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        info!(
            "Loaded player config from {}: lookahead={}, retry_budget={}",
            path.display(),
            config.lookahead,
            config.retry_budget
        );
        Ok(config)
    }

    /// Reject configurations that would disable the player outright.
    pub fn validate(&self) -> Result<()> {
        if self.lookahead == 0 {
            return Err(Error::Config("lookahead must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Fetch deadline as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Resolved scratch folder (explicit → environment → OS default).
    pub fn scratch_dir(&self) -> PathBuf {
        resolve_scratch_dir(self.scratch_dir.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.lookahead, 3);
        assert_eq!(config.retry_budget, 2);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.max_consecutive_failures, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lookahead = 5\nretry_budget = 1").unwrap();

        let config = PlayerConfig::load(file.path()).unwrap();
        assert_eq!(config.lookahead, 5);
        assert_eq!(config.retry_budget, 1);
        // Unspecified fields fall back to defaults
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_zero_lookahead_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lookahead = 0").unwrap();

        let err = PlayerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = PlayerConfig::load(Path::new("/nonexistent/jukebot.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
