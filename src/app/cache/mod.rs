//! Content-addressed resource cache with request coalescing
//!
//! Remote resources are stored under a name derived from their URL, so the
//! same URL always maps to the same file. Consumers lock a file for as long as
//! they are interested in it; while a file is locked, every request for it
//! shares one resolution stream and the file is safe from eviction.
//!
//! # Module Organization
//!
//! - [`naming`] - URL to cache file name
//! - [`lock`] - consumer locks and the stream registry
//! - [`stream`] - replaying multicast stream primitive
//! - [`resolution`] - the check, serve, fetch and revalidate protocol
//! - [`fetch`] - downloads into the cache with atomic writes
//! - [`eviction`] - size-bounded sweep, oldest unlocked files first
//! - [`directory`] - path confinement and file operations
//! - [`stats`] - cache statistics
//! - [`config`] - configuration and [`Strategy`]
//! - [`manager`] - the [`CacheManager`] tying it all together
//!
//! # Examples
//!
//! ```rust,no_run
//! use resource_cache::app::cache::{CacheConfig, CacheManager, Strategy};
//! use resource_cache::app::client::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheManager::with_http(CacheConfig::default(), &ClientConfig::default()).await?;
//! let url = "https://img.example.com/a/b/pic.png";
//!
//! // Hold a lock for as long as the file is in use
//! let guard = cache.lock(cache.name_for(url));
//! let stream = cache.observable_for(url, guard.consumer(), Strategy::Mutable, None)?;
//!
//! for resolution in stream.collect_all().await {
//!     match resolution.path {
//!         Some(path) => println!("available at {}", path.display()),
//!         None => println!("could not fetch {}", url),
//!     }
//! }
//! drop(guard);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
pub mod eviction;
pub mod fetch;
pub mod lock;
pub mod manager;
pub mod naming;
pub mod resolution;
pub mod stats;
pub mod stream;

#[cfg(test)]
pub mod tests;

// Re-export main public API
pub use config::{CacheConfig, Strategy};
pub use directory::{CacheDirectory, CacheEntry};
pub use eviction::{Evictor, SweepReport};
pub use fetch::{FetchMode, FetchOutcome, Fetcher};
pub use lock::{ConsumerId, LockGuard, LockTable};
pub use manager::{CacheManager, ImportOptions, ImportResult};
pub use naming::name_for;
pub use resolution::{Resolution, ResolutionStream};
pub use stats::CacheStats;
pub use stream::{Emitter, ReplayStream};
