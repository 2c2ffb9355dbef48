//! Configuration handling for docdex.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and vector files.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Chunk budget in characters, inclusive of inter-word spaces.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Debounce for filesystem change notifications (ms).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Log level filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_model_path() -> PathBuf {
    data_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_chunk_size() -> usize {
    512
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            chunk_size: default_chunk_size(),
            debounce_ms: default_debounce_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default config path, falling back to defaults when no
    /// file exists.
    pub fn load() -> Result<Self, String> {
        Self::load_from(Self::config_path())
    }

    /// Load from an explicit path; `None` yields the defaults.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| format!("cannot parse {}: {e}", path.display()))
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("DOCDEX_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.toml"));
        }
        ProjectDirs::from("", "", "docdex").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// A commented sample configuration file.
    pub fn sample_toml() -> String {
        let defaults = Self::default();
        format!(
            "# docdex configuration\n\n\
             # Directory holding the database and vector files.\n\
             model_path = \"{}\"\n\n\
             # Chunk budget in characters, inclusive of inter-word spaces.\n\
             chunk_size = {}\n\n\
             # Watcher debounce in milliseconds.\n\
             debounce_ms = {}\n\n\
             # Log level: trace, debug, info, warn, error.\n\
             log_level = \"{}\"\n",
            defaults.model_path.display(),
            defaults.chunk_size,
            defaults.debounce_ms,
            defaults.log_level,
        )
    }
}

/// The data directory for docdex state.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCDEX_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }
    ProjectDirs::from("", "", "docdex").map(|dirs| dirs.data_dir().to_path_buf())
}
