//! Well-known directories.

use std::path::PathBuf;

const APP_DIR: &str = "taskrelay";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "TASKRELAY_CACHE_DIR";

/// `~/.config/taskrelay`
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Directory holding availability caches.
pub fn cache_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::cache_dir().map(|dir| dir.join(APP_DIR))
}

/// Directory for log files and other local state.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
}
