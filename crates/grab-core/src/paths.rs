//! Locations under the grab home directory.

use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Environment variable overriding the grab home directory.
pub const HOME_ENV: &str = "GRAB_HOME";

/// Resolve the grab home directory (`$GRAB_HOME`, else `~/.grab`) using the
/// supplied environment lookup. `None` if no home directory can be found.
pub fn try_grab_home(env: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(val) = env(HOME_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".grab"))
}

/// Binary installation target: `<home>/bin`
pub fn bin_path(home: &Path) -> PathBuf {
    home.join("bin")
}

/// Run cache: `<home>/cache`
pub fn cache_path(home: &Path) -> PathBuf {
    home.join("cache")
}

/// Public key cache: `<home>/keys`
pub fn keys_path(home: &Path) -> PathBuf {
    home.join("keys")
}

/// Tracker store: `<home>/tracker.json`
pub fn tracker_path(home: &Path) -> PathBuf {
    home.join("tracker.json")
}

/// Optional configuration file: `<home>/config.toml`
pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

/// Temp path for an in-flight download of `dest`.
pub fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
