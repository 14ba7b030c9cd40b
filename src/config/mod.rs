use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::info;

use crate::error::SmsError;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub contacts: ContactCacheConfig,
}

/// Where the local cache lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file for the cache and preferences (default: platform data dir)
    pub db_path: Option<PathBuf>,
}

/// Sync engine and stream tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Row cap for the first (watermark = 0) conversation sync
    #[serde(default = "default_first_sync_limit")]
    pub first_sync_limit: usize,

    /// Maximum thread ids per batched detail query
    #[serde(default = "default_detail_batch_size")]
    pub detail_batch_size: usize,

    /// Quiet period before a conversation-level change triggers a sync
    #[serde(default = "default_conversation_debounce_ms")]
    pub conversation_debounce_ms: u64,

    /// Quiet period before a thread-level change triggers a sync
    #[serde(default = "default_message_debounce_ms")]
    pub message_debounce_ms: u64,

    /// Quiet period before a stream re-emits after cache/preference changes
    #[serde(default = "default_stream_debounce_ms")]
    pub stream_debounce_ms: u64,
}

/// Contact resolver cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactCacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_first_sync_limit() -> usize {
    500
}

fn default_detail_batch_size() -> usize {
    500
}

fn default_conversation_debounce_ms() -> u64 {
    500
}

fn default_message_debounce_ms() -> u64 {
    300
}

fn default_stream_debounce_ms() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    500
}

fn default_cache_ttl_secs() -> u64 {
    5 * 60
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            first_sync_limit: default_first_sync_limit(),
            detail_batch_size: default_detail_batch_size(),
            conversation_debounce_ms: default_conversation_debounce_ms(),
            message_debounce_ms: default_message_debounce_ms(),
            stream_debounce_ms: default_stream_debounce_ms(),
        }
    }
}

impl SyncConfig {
    pub fn conversation_debounce(&self) -> Duration {
        Duration::from_millis(self.conversation_debounce_ms)
    }

    pub fn message_debounce(&self) -> Duration {
        Duration::from_millis(self.message_debounce_ms)
    }

    pub fn stream_debounce(&self) -> Duration {
        Duration::from_millis(self.stream_debounce_ms)
    }
}

impl Default for ContactCacheConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl ContactCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, SmsError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| SmsError::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Resolved cache database path
    pub fn db_path(&self) -> Result<PathBuf, SmsError> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

/// Default database location inside the platform data directory
pub fn default_db_path() -> Result<PathBuf, SmsError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("sms-sync").join("cache.db"))
        .ok_or_else(|| SmsError::Config("Failed to determine data directory".to_string()))
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("sms-sync").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config").join("sms-sync").join("config.toml"));
    }

    paths
}

/// Initialize configuration from default paths
pub fn init_config() -> Result<(), SmsError> {
    info!("Initializing configuration from default paths");

    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return init_config_from_path(&path);
        }
    }

    info!("No config file found, using defaults");
    set_config(AppConfig::default())
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &Path) -> Result<(), SmsError> {
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .map_err(|e| SmsError::Config(format!("Failed to read config: {}", e)))?;

    set_config(AppConfig::from_toml_str(&content)?)
}

/// Set the global configuration
pub fn set_config(config: AppConfig) -> Result<(), SmsError> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock
                .write()
                .map_err(|e| SmsError::Config(format!("Failed to lock config: {}", e)))?;
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}

/// Current global configuration (defaults if never initialized)
pub fn get_config() -> Result<AppConfig, SmsError> {
    match CONFIG.get() {
        Some(lock) => lock
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| SmsError::Config(format!("Failed to lock config: {}", e))),
        None => Ok(AppConfig::default()),
    }
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}
