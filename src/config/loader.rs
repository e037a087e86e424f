//! Configuration structures and loading logic.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ops::PollSettings;

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub mod_management: ModManagementConfig,

    #[serde(default)]
    pub io: IoConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Mod API access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// 32 character hexadecimal API key.
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub game_id: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            game_id: 0,
            user_agent: default_user_agent(),
        }
    }
}

/// Where installed mods and state live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of all modsync data. Defaults to the platform data directory.
    #[serde(default)]
    pub root_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModManagementConfig {
    /// Install attempts allowed per mod per session.
    #[serde(default = "default_retries")]
    pub default_retries: u8,
}

impl Default for ModManagementConfig {
    fn default() -> Self {
        Self {
            default_retries: default_retries(),
        }
    }
}

/// Polling and transfer sizes for file and network operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_write_chunk_size")]
    pub write_chunk_size: usize,

    /// Transfers up to this size complete without a background worker.
    #[serde(default = "default_sync_write_threshold")]
    pub sync_write_threshold: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            write_chunk_size: default_write_chunk_size(),
            sync_write_threshold: default_sync_write_threshold(),
        }
    }
}

/// Response cache limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.mod.io/v1".to_string()
}

fn default_user_agent() -> String {
    format!("modsync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_retries() -> u8 {
    3
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_max_poll_attempts() -> u32 {
    30_000
}

fn default_write_chunk_size() -> usize {
    1024 * 1024
}

fn default_sync_write_threshold() -> usize {
    64 * 1024
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_max_entries() -> u64 {
    1024
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}. Create one from config.example.toml",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the effective storage root.
    pub fn root_directory(&self) -> PathBuf {
        self.storage.root_directory.clone().unwrap_or_else(|| {
            ProjectDirs::from("io", "modsync", "modsync")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".modsync"))
        })
    }

    pub fn state_file(&self) -> PathBuf {
        self.root_directory().join("state").join("mod_collection.json")
    }

    pub fn mods_directory(&self) -> PathBuf {
        self.root_directory().join("mods")
    }

    pub fn temp_directory(&self) -> PathBuf {
        self.root_directory().join("tmp")
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.io.poll_interval_ms),
            max_polls: self.io.max_poll_attempts,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }
}
