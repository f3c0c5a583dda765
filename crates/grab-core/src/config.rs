//! Runtime configuration.
//!
//! Built once at start-up from `<home>/config.toml` (optional) and the
//! `GRAB_*` environment variables, which take precedence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use grab_schema::Repository;
use serde::Deserialize;
use tracing::warn;

use crate::paths;

/// Install directory override.
pub const INSTALL_DIR_ENV: &str = "GRAB_INSTALL_DIR";
/// Run cache directory override.
pub const CACHE_DIR_ENV: &str = "GRAB_CACHE_DIR";
/// Semicolon-separated repository list (`url` or `name=url` items).
pub const REPOSITORIES_ENV: &str = "GRAB_REPOSITORIES";
/// Disable truncation of printed output.
pub const NO_TRUNCATE_ENV: &str = "GRAB_NO_TRUNCATE";
/// Allow updating and removing binaries grab did not install.
pub const REOWN_ENV: &str = "GRAB_REOWN";

/// Errors produced while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Neither `GRAB_HOME` nor a user home directory is available.
    #[error("Could not determine home directory. Set GRAB_HOME to override.")]
    NoHome,

    /// The config file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ConfigFile`].
    #[error("Invalid config file {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// On-disk `config.toml` schema. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Where installed binaries go.
    pub install_dir: Option<PathBuf>,
    /// Where `run` caches binaries.
    pub cache_dir: Option<PathBuf>,
    /// Repositories in priority order.
    #[serde(default, rename = "repository")]
    pub repositories: Vec<Repository>,
    /// File extension (or `"*"`) → command template with `{}` for the path.
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,
}

/// Effective configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of grab state.
    pub home: PathBuf,
    /// Where installed binaries go.
    pub install_dir: PathBuf,
    /// Where `run` caches binaries.
    pub cache_dir: PathBuf,
    /// Repositories in priority order.
    pub repositories: Vec<Repository>,
    /// Integration hooks keyed by file extension.
    pub hooks: BTreeMap<String, String>,
    /// Print full lines regardless of terminal width.
    pub no_truncate: bool,
    /// Treat binaries without our provenance as ours.
    pub reown: bool,
}

impl Config {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&|key| std::env::var(key).ok())
    }

    /// Load using an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn load_with(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let home = paths::try_grab_home(env).ok_or(ConfigError::NoHome)?;
        let file = ConfigFile::read(&paths::config_path(&home))?;
        Ok(Self::from_parts(home, file, env))
    }

    /// Combine a parsed config file with environment overrides.
    pub fn from_parts(
        home: PathBuf,
        file: ConfigFile,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let install_dir = var(INSTALL_DIR_ENV)
            .map(PathBuf::from)
            .or(file.install_dir)
            .unwrap_or_else(|| paths::bin_path(&home));
        let cache_dir = var(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .or(file.cache_dir)
            .unwrap_or_else(|| paths::cache_path(&home));

        let repositories = match var(REPOSITORIES_ENV) {
            Some(list) => merge_repositories(&list, file.repositories),
            None => file.repositories,
        };

        Self {
            install_dir,
            cache_dir,
            repositories,
            hooks: file.hooks,
            no_truncate: var(NO_TRUNCATE_ENV).is_some_and(|v| is_truthy(&v)),
            reown: var(REOWN_ENV).is_some_and(|v| is_truthy(&v)),
            home,
        }
    }

    /// Look up a configured repository by name.
    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Public key cache directory.
    pub fn keys_dir(&self) -> PathBuf {
        paths::keys_path(&self.home)
    }

    /// Tracker store location.
    pub fn tracker_path(&self) -> PathBuf {
        paths::tracker_path(&self.home)
    }
}

impl ConfigFile {
    /// Read `path`, returning the default when it does not exist.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Environment-listed repositories replace the file's list, but keep the
/// file's public keys for any repository listed under the same name.
fn merge_repositories(list: &str, from_file: Vec<Repository>) -> Vec<Repository> {
    list.split(';')
        .filter_map(|item| {
            let repo = Repository::parse_item(item);
            if repo.is_none() && !item.trim().is_empty() {
                warn!(%item, "Ignoring unrecognised repository");
            }
            repo
        })
        .map(|mut repo| {
            if let Some(known) = from_file.iter().find(|r| r.name == repo.name) {
                repo.pubkeys.clone_from(&known.pubkeys);
            }
            repo
        })
        .collect()
}

fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_live_under_home() {
        let cfg = Config::from_parts(PathBuf::from("/h"), ConfigFile::default(), &env_of(&[]));
        assert_eq!(cfg.install_dir, PathBuf::from("/h/bin"));
        assert_eq!(cfg.cache_dir, PathBuf::from("/h/cache"));
        assert!(cfg.repositories.is_empty());
        assert!(!cfg.reown);
    }

    #[test]
    fn env_overrides_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            install_dir = "/file/bin"

            [[repository]]
            name = "main"
            url = "https://file/index.json"
            pubkeys = { main = "https://file/minisign.pub" }

            [hooks]
            desktop = "update-desktop-database {}"
            "#,
        )
        .unwrap();

        let env = env_of(&[
            (INSTALL_DIR_ENV, "/env/bin"),
            (REPOSITORIES_ENV, "main=https://env/index.json;https://other.example/i.json"),
            (REOWN_ENV, "true"),
        ]);
        let cfg = Config::from_parts(PathBuf::from("/h"), file, &env);

        assert_eq!(cfg.install_dir, PathBuf::from("/env/bin"));
        assert_eq!(cfg.repositories.len(), 2);
        assert_eq!(cfg.repositories[0].url, "https://env/index.json");
        assert!(cfg.repositories[0].is_signed());
        assert_eq!(cfg.repositories[1].name, "other.example");
        assert!(cfg.reown);
        assert_eq!(cfg.hooks["desktop"], "update-desktop-database {}");
    }

    #[test]
    fn bare_path_repository_is_kept() {
        let env = env_of(&[(REPOSITORIES_ENV, "/srv/grab/index.json;bogus")]);
        let cfg = Config::from_parts(PathBuf::from("/h"), ConfigFile::default(), &env);
        assert_eq!(cfg.repositories.len(), 1);
        assert_eq!(cfg.repositories[0].name, "index");
        assert_eq!(cfg.repositories[0].url, "/srv/grab/index.json");
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::read(&dir.path().join("config.toml")).unwrap();
        assert!(file.repositories.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "colour = true\n").unwrap();
        assert!(matches!(
            ConfigFile::read(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
