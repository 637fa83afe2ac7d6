//! Cache configuration types and defaults
//!
//! This module contains the runtime configuration of the cache and the
//! consistency [`Strategy`] a resolution runs under.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::cache;
use crate::errors::CacheError;

/// Consistency policy for a cached file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Trust a previously cached file forever
    #[default]
    Immutable,
    /// Serve the cached file, then revalidate it against the origin
    Mutable,
}

impl Strategy {
    /// Lowercase name as used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Immutable => "immutable",
            Strategy::Mutable => "mutable",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immutable" => Ok(Strategy::Immutable),
            "mutable" => Ok(Strategy::Mutable),
            other => Err(CacheError::UnhandledStrategy {
                strategy: other.to_string(),
            }),
        }
    }
}

/// Configuration for the cache management system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for cache storage (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Namespace directory appended to the OS cache directory
    pub namespace: String,
    /// Maximum cache size in bytes (0 = unlimited)
    pub max_cache_size: u64,
    /// Strategy used when the caller does not pick one
    pub default_strategy: Strategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            namespace: cache::DEFAULT_NAMESPACE.to_string(),
            max_cache_size: cache::DEFAULT_MAX_CACHE_SIZE,
            default_strategy: Strategy::Immutable,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with custom cache root
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Set maximum cache size in bytes
    pub fn with_max_cache_size(mut self, max_size: u64) -> Self {
        self.max_cache_size = max_size;
        self
    }

    /// Set the namespace directory
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the default strategy
    pub fn with_default_strategy(mut self, strategy: Strategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Whether a budget is configured at all
    pub fn has_budget(&self) -> bool {
        self.max_cache_size > 0
    }
}
