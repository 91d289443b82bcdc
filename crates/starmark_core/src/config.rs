//! Static configuration and startup feature flags.
//!
//! # Responsibility
//! - Hold storage key prefixes, default paths and timing constants.
//! - Resolve the one-shot `remote_store` flag that picks the annotation backend.
//!
//! # Invariants
//! - Configuration is resolved once at startup; nothing toggles it afterwards.
//! - Environment overrides win over file values, file values over defaults.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key prefix for per-repository tag lists in the local backend.
pub const TAGS_KEY_PREFIX: &str = "starmark_tags_";
/// Key prefix for per-repository notes in the local backend.
pub const NOTES_KEY_PREFIX: &str = "starmark_notes_";
/// Browser-like storage capacity for the local backend.
pub const DEFAULT_LOCAL_QUOTA_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_DATA_FILE: &str = "data/stars.json";
pub const DEFAULT_LOCAL_STORE_FILE: &str = "starmark-annotations.json";
pub const DEFAULT_SQLITE_FILE: &str = "starmark.sqlite3";
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_NOTES_DEBOUNCE_MS: u64 = 1000;

const ENV_DATA_FILE: &str = "STARMARK_DATA_FILE";
const ENV_REMOTE_STORE: &str = "STARMARK_REMOTE_STORE";
const ENV_LOCAL_STORE_FILE: &str = "STARMARK_LOCAL_STORE_FILE";
const ENV_SQLITE_FILE: &str = "STARMARK_SQLITE_FILE";
const ENV_LOCAL_QUOTA: &str = "STARMARK_LOCAL_QUOTA_BYTES";
const ENV_LOG_LEVEL: &str = "STARMARK_LOG_LEVEL";
const ENV_LOG_DIR: &str = "STARMARK_LOG_DIR";

/// Which annotation backend the facade runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Key-value file on the local machine.
    Local,
    /// Two-table SQLite store.
    Remote,
}

impl StoreMode {
    pub fn from_flag(remote_store: bool) -> Self {
        if remote_store {
            Self::Remote
        } else {
            Self::Local
        }
    }

    /// Identity written into the `source` field of exports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Application configuration resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Static JSON file written by the sync job.
    pub data_file: PathBuf,
    /// Feature flag: use the SQLite table store instead of the local file.
    pub remote_store: bool,
    pub local_store_file: PathBuf,
    pub local_quota_bytes: usize,
    pub sqlite_file: PathBuf,
    pub search_debounce_ms: u64,
    pub notes_debounce_ms: u64,
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files. Logging is off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            remote_store: false,
            local_store_file: PathBuf::from(DEFAULT_LOCAL_STORE_FILE),
            local_quota_bytes: DEFAULT_LOCAL_QUOTA_BYTES,
            sqlite_file: PathBuf::from(DEFAULT_SQLITE_FILE),
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            notes_debounce_ms: DEFAULT_NOTES_DEBOUNCE_MS,
            log_level: None,
            log_dir: None,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidValue {
        key: &'static str,
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value `{value}` for {key}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl AppConfig {
    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads an optional config file, then applies `STARMARK_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a lookup function (the process environment in
    /// production, a map in tests).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DATA_FILE) {
            self.data_file = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_REMOTE_STORE) {
            self.remote_store = parse_flag(ENV_REMOTE_STORE, &value)?;
        }
        if let Some(value) = lookup(ENV_LOCAL_STORE_FILE) {
            self.local_store_file = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_SQLITE_FILE) {
            self.sqlite_file = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_LOCAL_QUOTA) {
            self.local_quota_bytes = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_LOCAL_QUOTA,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = Some(value);
        }
        if let Some(value) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(value));
        }
        Ok(self)
    }

    pub fn store_mode(&self) -> StoreMode {
        StoreMode::from_flag(self.remote_store)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn notes_debounce(&self) -> Duration {
        Duration::from_millis(self.notes_debounce_ms)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, StoreMode};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_select_local_store() {
        let config = AppConfig::default();
        assert_eq!(config.store_mode(), StoreMode::Local);
        assert_eq!(config.search_debounce().as_millis(), 300);
    }

    #[test]
    fn env_overrides_flip_remote_flag_and_paths() {
        let config = AppConfig::default()
            .with_overrides(lookup(&[
                ("STARMARK_REMOTE_STORE", "true"),
                ("STARMARK_DATA_FILE", "/tmp/stars.json"),
            ]))
            .unwrap();
        assert_eq!(config.store_mode(), StoreMode::Remote);
        assert_eq!(config.data_file, PathBuf::from("/tmp/stars.json"));
    }

    #[test]
    fn invalid_flag_value_is_rejected() {
        let err = AppConfig::default()
            .with_overrides(lookup(&[("STARMARK_REMOTE_STORE", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"remote_store": true}"#).unwrap();
        assert!(config.remote_store);
        assert_eq!(config.local_quota_bytes, super::DEFAULT_LOCAL_QUOTA_BYTES);
    }
}
