//! Configuration module for the sync pipeline.
//!
//! Settings are layered:
//! - Default values (derived from the platform's data, config, and runtime dirs)
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TREESYNC_` and use double
//! underscores to separate nested levels:
//! - `TREESYNC_SYNC_ROOT=/data/sync` sets `sync_root`
//! - `TREESYNC_SYNC_QUEUE_SIZE=4096` sets `sync_queue_size`
//! - `TREESYNC_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::status::DEFAULT_MAX_EVENTS;

const APP_DIR: &str = "treesync";
const ENV_PREFIX: &str = "TREESYNC_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory tree mirrored by the sync engine
    #[serde(default = "default_sync_root")]
    pub sync_root: PathBuf,

    /// Glob patterns matched against base names; matches never sync
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Number of recent events kept for status queries
    #[serde(default = "default_event_log_size")]
    pub event_log_size: usize,

    /// Capacity of the queue feeding the sync engine
    #[serde(default = "default_sync_queue_size")]
    pub sync_queue_size: usize,

    /// Metadata store file (always ignored by the watcher)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Daemon log file (always ignored by the watcher)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<PathBuf>,

    /// Control socket (always ignored by the watcher)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `treesync::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_event_log_size() -> usize {
    DEFAULT_MAX_EVENTS
}
fn default_sync_queue_size() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_ignore_patterns() -> Vec<String> {
    ["*.swp", "*.tmp", "*~", ".DS_Store"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

fn default_sync_root() -> PathBuf {
    data_dir().join("sync")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let data = data_dir();
        Self {
            version: default_version(),
            sync_root: data.join("sync"),
            ignore_patterns: default_ignore_patterns(),
            event_log_size: default_event_log_size(),
            sync_queue_size: default_sync_queue_size(),
            database_path: Some(data.join("treesync.db")),
            log_file_path: Some(data.join("logs").join("daemon.log")),
            socket_path: Some(runtime_dir().join("daemon.sock")),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Default location of the settings file: `<config dir>/treesync/settings.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("settings.toml")
    }

    /// Load configuration from all sources.
    ///
    /// `config_path` overrides the default settings file location. A missing
    /// file is not an error; defaults and environment still apply.
    pub fn load(config_path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscore
            // stays part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
            .map(Settings::normalized)
    }

    /// Load configuration from a specific file without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(Box::new)
            .map(Settings::normalized)
    }

    /// Zero sizes fall back to their defaults.
    fn normalized(mut self) -> Self {
        if self.sync_queue_size == 0 {
            self.sync_queue_size = DEFAULT_QUEUE_CAPACITY;
        }
        if self.event_log_size == 0 {
            self.event_log_size = DEFAULT_MAX_EVENTS;
        }
        self
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write a default settings file, refusing to overwrite unless `force`.
    pub fn init_config_file(
        path: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !force && path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(path)?;
        Ok(path.to_path_buf())
    }
}
