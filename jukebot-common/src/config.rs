//! Configuration file and scratch-folder resolution
//!
//! Path resolution priority order:
//! 1. Explicit path from the embedding application (highest priority)
//! 2. Environment variable
//! 3. OS-dependent compiled default (fallback)

use std::path::PathBuf;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV_VAR: &str = "JUKEBOT_CONFIG";

/// Environment variable naming the scratch folder for downloaded artifacts.
pub const SCRATCH_ENV_VAR: &str = "JUKEBOT_SCRATCH";

/// Resolve the scratch folder used for downloaded media artifacts.
///
/// Priority: explicit path → `JUKEBOT_SCRATCH` → OS data-local dir →
/// `./jukebot_scratch` as last resort.
pub fn resolve_scratch_dir(explicit: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path.clone();
    }

    if let Ok(path) = std::env::var(SCRATCH_ENV_VAR) {
        return PathBuf::from(path);
    }

    default_scratch_dir()
}

/// OS-dependent default scratch folder.
pub fn default_scratch_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("jukebot").join("scratch"))
        .unwrap_or_else(|| PathBuf::from("./jukebot_scratch"))
}

/// Locate the TOML config file, if one exists.
///
/// Checks `JUKEBOT_CONFIG` first, then the platform config directory
/// (`~/.config/jukebot/config.toml` on Linux).
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    dirs::config_dir()
        .map(|d| d.join("jukebot").join("config.toml"))
        .filter(|p| p.exists())
}
