//! Configuration discovery and loading
//!
//! Discovery hierarchy, first match wins:
//! 1. Current directory: ./shelf.toml or ./.shelf/config.toml
//! 2. User config: ~/.shelf/config.toml
//! 3. Built-in defaults
//!
//! `SHELF_API_URL` overrides `api.base_url` wherever the file came from.

use crate::env;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Remote service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: env::api::DEFAULT_BASE_URL.to_string(),
            timeout_secs: env::api::DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this refetch on read. Unset means only
    /// invalidation makes an entry stale.
    pub stale_after_secs: Option<u64>,
}

impl CacheConfig {
    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooksConfig {
    pub page_size: u32,
}

impl Default for BooksConfig {
    fn default() -> Self {
        Self {
            page_size: env::api::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Token file location; defaults to ~/.shelf/tokens.json
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub books: BooksConfig,
    pub storage: StorageConfig,
}

impl ShelfConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace the API base URL when an override is given
    pub fn apply_api_url_override(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
            debug!("Overriding api.base_url from {}", env::API_URL_ENV);
            self.api.base_url = url;
        }
    }

    /// Token file path, resolved against the home directory when unset
    pub fn token_file(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.token_file {
            Some(path) => Ok(path.clone()),
            None => env::home_dir()
                .map(|home| env::user_token_file_path(&home))
                .ok_or(ConfigError::NoHomeDir),
        }
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover configuration and apply environment overrides.
    ///
    /// Returns the file the configuration came from, if any.
    pub fn discover() -> Result<(ShelfConfig, Option<PathBuf>), ConfigError> {
        let found = Self::find_config_file();
        let mut config = match &found {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                ShelfConfig::from_toml_file(path)?
            }
            None => {
                info!("No configuration file found, using defaults");
                ShelfConfig::default()
            }
        };

        config.apply_api_url_override(std::env::var(env::API_URL_ENV).ok());
        Ok((config, found))
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::config_candidates().into_iter().find(|candidate| {
            debug!("Checking for config file: {:?}", candidate);
            candidate.is_file()
        })
    }

    /// Configuration file candidates in priority order
    pub fn config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std::env::current_dir() {
            candidates.extend(env::local_config_file_paths(&current_dir));
        }
        if let Some(home_dir) = env::home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        candidates
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        for (i, candidate) in Self::config_candidates().iter().enumerate() {
            let status = if candidate.is_file() {
                "✓ EXISTS"
            } else if candidate.exists() {
                "✗ NOT A FILE"
            } else {
                "✗ NOT FOUND"
            };
            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::find_config_file() {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }
        if let Ok(url) = std::env::var(env::API_URL_ENV) {
            println!("{} override: {}", env::API_URL_ENV, url);
        }
    }
}
