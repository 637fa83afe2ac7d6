//! Cache manager: the public face of the cache
//!
//! A [`CacheManager`] owns the lock table, the stream registry and the cache
//! directory for one namespace. Clones share all of that state, so a manager
//! can be handed to as many tasks as needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use filetime::{set_file_mtime, FileTime};
use futures::{FutureExt, StreamExt};
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::client::{ClientConfig, Downloader, HttpDownloader};
use crate::constants::cache;
use crate::errors::{CacheError, CacheResult, Result};

use super::config::{CacheConfig, Strategy};
use super::directory::CacheDirectory;
use super::eviction::{Evictor, SweepReport};
use super::fetch::Fetcher;
use super::lock::{ConsumerId, LockGuard, LockTable};
use super::naming;
use super::resolution::{ResolveTask, Resolution, ResolutionStream};
use super::stats::CacheStats;
use super::stream::ReplayStream;

/// Options for [`CacheManager::import_local_file`]
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Move the source instead of copying it
    pub move_file: bool,
    /// Creation time of the resource; used as mtime when `modified_at` is unset
    pub created_at: Option<SystemTime>,
    /// Modification time to stamp on the cached file
    pub modified_at: Option<SystemTime>,
}

impl ImportOptions {
    /// Move the source file into the cache
    pub fn moving() -> Self {
        Self {
            move_file: true,
            ..Default::default()
        }
    }

    /// Set the modification time
    pub fn with_modified_at(mut self, modified_at: SystemTime) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// Set the creation time
    pub fn with_created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = Some(created_at);
        self
    }

    fn mtime(&self) -> Option<SystemTime> {
        self.modified_at.or(self.created_at)
    }
}

/// Result of an import: the URL and where it now lives, if anywhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub url: String,
    pub path: Option<PathBuf>,
}

/// Main cache management system
#[derive(Debug, Clone)]
pub struct CacheManager {
    config: CacheConfig,
    directory: CacheDirectory,
    locks: Arc<LockTable>,
    evictor: Evictor,
    fetcher: Fetcher,
}

impl CacheManager {
    /// Create a cache manager downloading through `downloader`
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the cache directory cannot be created
    pub async fn new(config: CacheConfig, downloader: Arc<dyn Downloader>) -> CacheResult<Self> {
        let cache_root = match &config.cache_root {
            Some(path) => path.clone(),
            None => Self::default_cache_dir(&config.namespace)?,
        };

        let directory = CacheDirectory::new(cache_root);
        directory.ensure_exists().await?;

        let locks = Arc::new(LockTable::new());
        let evictor = Evictor::new(directory.clone(), Arc::clone(&locks), config.max_cache_size);
        let fetcher = Fetcher::new(directory.clone(), evictor.clone(), downloader);

        info!(
            "Initialized cache manager with root: {}",
            directory.root().display()
        );

        Ok(Self {
            config,
            directory,
            locks,
            evictor,
            fetcher,
        })
    }

    /// Create a cache manager with the reqwest-backed downloader
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the HTTP client cannot be built or the cache
    /// directory cannot be created
    pub async fn with_http(config: CacheConfig, client_config: &ClientConfig) -> Result<Self> {
        let downloader = HttpDownloader::with_config(client_config)?;
        Ok(Self::new(config, Arc::new(downloader)).await?)
    }

    /// Default cache directory for a namespace: `<os cache dir>/resource-cache/<namespace>`
    fn default_cache_dir(namespace: &str) -> CacheResult<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| CacheError::DirectoryNotAccessible {
                path: PathBuf::from("system cache directory"),
            })?
            .join(cache::APP_DIR_NAME)
            .join(namespace);

        Ok(cache_dir)
    }

    /// Get the cache root directory
    pub fn cache_root(&self) -> &Path {
        self.directory.root()
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache file name for `url`
    pub fn name_for(&self, url: &str) -> String {
        naming::name_for(url)
    }

    /// Local path `url` is cached at, whether or not it is cached yet
    pub fn path_for(&self, url: &str) -> CacheResult<PathBuf> {
        self.directory.path_of(&naming::name_for(url))
    }

    /// A consumer id no other consumer of this manager has
    pub fn next_consumer_id(&self) -> ConsumerId {
        self.locks.next_consumer_id()
    }

    /// Register `consumer`'s interest in `file_name`
    pub fn lock_cache_file(&self, file_name: &str, consumer: ConsumerId) {
        self.locks.acquire(file_name, consumer);
    }

    /// Withdraw `consumer`'s interest in `file_name`.
    ///
    /// Returns `true` if nobody holds the file any more, in which case its
    /// resolution stream has been torn down.
    pub fn unlock_cache_file(&self, file_name: &str, consumer: ConsumerId) -> bool {
        self.locks.release(file_name, consumer)
    }

    /// Whether any consumer holds `file_name`
    pub fn is_locked(&self, file_name: &str) -> bool {
        self.locks.is_locked(file_name)
    }

    /// Lock `file_name` for a fresh consumer until the guard is dropped
    pub fn lock(&self, file_name: impl Into<String>) -> LockGuard {
        LockGuard::acquire(Arc::clone(&self.locks), file_name)
    }

    /// Shared resolution stream for `url`.
    ///
    /// `file_name` overrides the name derived from the URL. An empty URL
    /// yields a stream with a single failed resolution and needs no lock.
    ///
    /// # Errors
    ///
    /// - `CacheError::LockRequired` if `consumer` does not hold the file
    /// - `CacheError::PathTraversal` if `file_name` escapes the cache root
    pub fn observable_for(
        &self,
        url: &str,
        consumer: ConsumerId,
        strategy: Strategy,
        file_name: Option<&str>,
    ) -> CacheResult<ResolutionStream> {
        self.observable_with_headers(url, consumer, strategy, file_name, HeaderMap::new())
    }

    /// [`observable_for`](Self::observable_for) with headers for the download
    ///
    /// Headers only take effect when this call creates the stream; callers
    /// that coalesce onto a live stream share the first caller's request.
    pub fn observable_with_headers(
        &self,
        url: &str,
        consumer: ConsumerId,
        strategy: Strategy,
        file_name: Option<&str>,
        headers: HeaderMap,
    ) -> CacheResult<ResolutionStream> {
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None if url.is_empty() => String::new(),
            None => naming::name_for(url),
        };

        if url.is_empty() {
            return Ok(ReplayStream::completed(vec![Resolution::missing(file_name)]));
        }

        self.directory.path_of(&file_name)?;

        self.locks.stream_for(&file_name, consumer, || {
            let task = ResolveTask {
                url: url.to_string(),
                file_name: file_name.clone(),
                strategy,
                headers,
                directory: self.directory.clone(),
                fetcher: self.fetcher.clone(),
            };
            ReplayStream::new(move |emitter| task.run(emitter).boxed())
        })
    }

    /// Resolve `url` once with the immutable strategy and return the local
    /// path, or `None` if it could not be fetched
    ///
    /// # Errors
    ///
    /// Returns `CacheError::PathTraversal` if the derived name escapes the
    /// cache root
    pub async fn resolve_local_path(&self, url: &str) -> CacheResult<Option<PathBuf>> {
        if url.is_empty() {
            return Ok(None);
        }

        let guard = self.lock(naming::name_for(url));
        let stream = self.observable_for(url, guard.consumer(), Strategy::Immutable, None)?;
        let first = stream.subscribe().next().await;
        drop(guard);

        Ok(first.and_then(|resolution| resolution.path))
    }

    /// Place a local file under the cache name of `url`.
    ///
    /// Runs the same pre-write sweep as a download of a new file, replaces any
    /// existing copy, and appends the result to the live resolution stream of
    /// the file if there is one. Copy failures are reported as a result
    /// without a path.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the cache directory cannot be created or the
    /// derived name escapes the cache root
    pub async fn import_local_file(
        &self,
        local_path: &Path,
        url: &str,
        options: ImportOptions,
    ) -> CacheResult<ImportResult> {
        let file_name = naming::name_for(url);
        let target = self.directory.path_of(&file_name)?;

        self.directory.ensure_exists().await?;
        if !self.directory.exists(&target).await? {
            self.evictor.sweep().await;
        }

        // Dropping the temp path on any failure below removes the partial copy
        let placed = match self.directory.temp_file_for(&file_name) {
            Ok(temp) => {
                let written = if options.move_file {
                    self.directory.move_file(local_path, &temp).await
                } else {
                    self.directory.copy(local_path, &temp).await.map(|_| ())
                };
                let stamped = written.and_then(|()| {
                    if let Some(mtime) = options.mtime() {
                        set_file_mtime(&temp, FileTime::from_system_time(mtime))?;
                    }
                    Ok(())
                });
                stamped.and_then(|()| self.directory.persist(temp, &target))
            }
            Err(e) => Err(e),
        };

        if let Err(e) = placed {
            warn!("Failed to import {} for {}: {}", local_path.display(), url, e);
            return Ok(ImportResult {
                url: url.to_string(),
                path: None,
            });
        }

        info!("Imported {} as {}", local_path.display(), file_name);
        if let Some(stream) = self.locks.live_stream(&file_name) {
            stream.publish(Resolution::found(&target, &file_name));
        }

        Ok(ImportResult {
            url: url.to_string(),
            path: Some(target),
        })
    }

    /// Delete one cache entry, or the whole cache tree if `file_name` is empty.
    ///
    /// Returns whether the deletion succeeded; an entry that does not exist
    /// counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::PathTraversal` if `file_name` escapes the cache root
    pub async fn flush(&self, file_name: &str) -> CacheResult<bool> {
        let result = if file_name.is_empty() {
            self.directory.remove_all().await
        } else {
            let path = self.directory.path_of(file_name)?;
            self.directory.unlink(path).await
        };

        match result {
            Ok(()) => {
                info!(
                    "Flushed {}",
                    if file_name.is_empty() { "cache" } else { file_name }
                );
                Ok(true)
            }
            Err(CacheError::PathTraversal { path }) => Err(CacheError::PathTraversal { path }),
            Err(e) => {
                warn!("Failed to flush {}: {}", file_name, e);
                Ok(false)
            }
        }
    }

    /// Run an eviction sweep now
    pub async fn sweep(&self) -> SweepReport {
        self.evictor.sweep().await
    }

    /// Whether `file_name` is present in the cache
    pub async fn exists(&self, file_name: &str) -> CacheResult<bool> {
        let path = self.directory.path_of(file_name)?;
        self.directory.exists(path).await
    }

    /// Current cache statistics
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let entries = self.directory.list().await?;
        let total_size = entries.iter().map(|entry| entry.size).sum();

        let mut stats = CacheStats::new(self.directory.root().to_path_buf(), self.config.max_cache_size);
        stats.set_disk_stats(entries.len(), total_size);
        stats.set_lock_stats(self.locks.locked_files(), self.locks.live_streams());
        Ok(stats)
    }
}
