use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::address::{DEFAULT_SHARD_SIZE, ShardLayout};
use crate::cache::{CacheConfig, DEFAULT_MAX_OPEN_HANDLES, DEFAULT_MAX_RETRIES};
use crate::error::ConfigError;

/// File name looked up in the store's base directory.
pub const STORE_CONFIG_FILE: &str = "lts.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_shard_size")]
    pub shard_size: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            shard_size: default_shard_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_open_handles")]
    pub max_open_handles: usize,
    /// Upper bound on a blocking eviction, in milliseconds. Absent means
    /// wait as long as it takes.
    #[serde(default)]
    pub eviction_wait_ms: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_open_handles: default_max_open_handles(),
            eviction_wait_ms: None,
            max_retries: default_max_retries(),
        }
    }
}

impl StoreConfig {
    /// Check that the values describe a usable store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero shard size, handle budget or retry
    /// budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout()?;
        self.cache_config()?;
        Ok(())
    }

    /// Shard geometry described by this config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroShardSize`] if `shard_size` is zero.
    pub const fn layout(&self) -> Result<ShardLayout, ConfigError> {
        ShardLayout::new(self.layout.shard_size)
    }

    /// Handle cache settings described by this config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] if `max_open_handles` is zero
    /// and [`ConfigError::ZeroRetries`] if `max_retries` is zero.
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        if self.cache.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(CacheConfig::new(self.cache.max_open_handles)?
            .with_eviction_wait(self.cache.eviction_wait_ms.map(Duration::from_millis))
            .with_max_retries(self.cache.max_retries))
    }
}

/// Parse a config file. A missing file yields the defaults.
pub fn load_config_file(path: &Path) -> Result<StoreConfig> {
    if !path.exists() {
        return Ok(StoreConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<StoreConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<base_path>/lts.toml`, or the defaults if it does not exist.
pub fn load_store_config(base_path: &Path) -> Result<StoreConfig> {
    load_config_file(&base_path.join(STORE_CONFIG_FILE))
}

/// Location of the per-user config file, if the platform has a config dir.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lts/config.toml"))
}

/// Resolve the effective config for a store rooted at `base_path`.
///
/// Precedence: `explicit` file, then `<base_path>/lts.toml`, then the user
/// config file, then built-in defaults. `LTS_SHARD_SIZE` and
/// `LTS_MAX_OPEN_HANDLES` override whatever was loaded.
pub fn resolve_config(base_path: &Path, explicit: Option<&Path>) -> Result<StoreConfig> {
    let store_file = base_path.join(STORE_CONFIG_FILE);
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None if store_file.exists() => Some(store_file),
        None => user_config_path().filter(|path| path.exists()),
    };

    let loaded = match source {
        Some(path) => load_config_file(&path)?,
        None => StoreConfig::default(),
    };

    let config = apply_env_overrides(loaded, |key| env::var(key).ok())?;
    config.validate().context("Invalid store configuration")?;
    Ok(config)
}

fn apply_env_overrides(
    mut config: StoreConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<StoreConfig> {
    if let Some(raw) = lookup("LTS_SHARD_SIZE") {
        config.layout.shard_size = raw
            .trim()
            .parse()
            .with_context(|| format!("LTS_SHARD_SIZE is not a byte count: {raw}"))?;
    }
    if let Some(raw) = lookup("LTS_MAX_OPEN_HANDLES") {
        config.cache.max_open_handles = raw
            .trim()
            .parse()
            .with_context(|| format!("LTS_MAX_OPEN_HANDLES is not a count: {raw}"))?;
    }
    Ok(config)
}

const fn default_shard_size() -> u64 {
    DEFAULT_SHARD_SIZE
}

const fn default_max_open_handles() -> usize {
    DEFAULT_MAX_OPEN_HANDLES
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
