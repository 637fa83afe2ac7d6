//! Prelude module for the resource cache
//!
//! Re-exports the items a typical integration needs, so a single
//! `use resource_cache::prelude::*;` is enough.
//!
//! # Usage
//!
//! ```rust,no_run
//! use resource_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let cache = CacheManager::with_http(CacheConfig::default(), &ClientConfig::default()).await?;
//!
//!     if let Some(path) = cache.resolve_local_path("https://example.com/logo.svg").await? {
//!         println!("cached at {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, CacheError, Result};

// Essential cache components
pub use crate::app::{
    name_for, CacheConfig, CacheManager, CacheStats, ClientConfig, ConsumerId, Downloader,
    HttpDownloader, ImportOptions, ImportResult, LockGuard, Resolution, ResolutionStream,
    Strategy, SweepReport,
};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
