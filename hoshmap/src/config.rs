//! Cache Configuration
//!
//! Describes which cache tiers to build. Nothing in the crate reads this on
//! its own; build a [`CacheChain`] from it and attach the chain explicitly.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOSHMAP_MEMORY_CACHE` | In-process tier ("true"/"false") | true |
//! | `HOSHMAP_CACHE_DIR` | Directory tier root | unset |
//! | `HOSHMAP_CACHE_DB` | SQLite tier database file | unset |
//! | `HOSHMAP_EAGER` | Persistent tiers receive already-evaluated values | true |
//! | `HOSHMAP_CACHE` | Root used by [`default_cache_dir`] | `~/.hoshmap/cache` |
//!
//! # Example
//!
//! ```rust,ignore
//! use hoshmap::config::{default_cache_dir, CacheConfig};
//!
//! let chain = CacheConfig::builder()
//!     .cache_dir(default_cache_dir())
//!     .build()?
//!     .build_chain()?;
//! let map = map.attach_caches(&chain)?;
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheChain, CacheError, CacheTier, DirCache, MemoryCache, SqliteCache, Tier};

/// Configuration error.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid configuration for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Which cache tiers to build, in lookup order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// In-process tier, consulted first.
    pub memory: bool,
    /// Directory tier root.
    pub cache_dir: Option<PathBuf>,
    /// SQLite database file.
    pub database: Option<PathBuf>,
    /// Whether persistent tiers are eager.
    pub eager: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: true,
            cache_dir: None,
            database: None,
            eager: true,
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    /// Loads configuration from `HOSHMAP_` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = parse_env_bool("HOSHMAP_MEMORY_CACHE") {
            config.memory = val;
        }
        if let Some(path) = parse_env_path("HOSHMAP_CACHE_DIR") {
            config.cache_dir = Some(path);
        }
        if let Some(path) = parse_env_path("HOSHMAP_CACHE_DB") {
            config.database = Some(path);
        }
        if let Some(val) = parse_env_bool("HOSHMAP_EAGER") {
            config.eager = val;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.memory && self.cache_dir.is_none() && self.database.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "tiers".into(),
                message: "at least one cache tier must be enabled".into(),
            });
        }
        Ok(())
    }

    /// Opens the configured tiers: memory, then directory, then SQLite.
    pub fn build_chain(&self) -> Result<CacheChain, CacheError> {
        let mut chain = CacheChain::new();
        if self.memory {
            chain.push(Tier::new(Arc::new(MemoryCache::new())));
        }
        if let Some(dir) = &self.cache_dir {
            let store = Arc::new(DirCache::open(dir)?);
            chain.push(self.persistent(store));
        }
        if let Some(db) = &self.database {
            let store = Arc::new(SqliteCache::open(db)?);
            chain.push(self.persistent(store));
        }
        debug!(tiers = chain.len(), eager = self.eager, "cache chain built");
        Ok(chain)
    }

    fn persistent<C: CacheTier + 'static>(&self, store: Arc<C>) -> Tier {
        if self.eager {
            Tier::eager(store)
        } else {
            Tier::new(store)
        }
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(mut self, enabled: bool) -> Self {
        self.config.memory = enabled;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn database(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database = Some(path.into());
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.config.eager = eager;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Root of the on-disk cache: `$HOSHMAP_CACHE`, else `~/.hoshmap/cache`.
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = parse_env_path("HOSHMAP_CACHE") {
        return dir;
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hoshmap")
        .join("cache")
}

fn parse_env_path(name: &str) -> Option<PathBuf> {
    env::var_os(name).filter(|s| !s.is_empty()).map(PathBuf::from)
}

fn parse_env_bool(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|s| match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    })
}
