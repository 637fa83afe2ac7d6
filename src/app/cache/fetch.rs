//! Fetch operation: download a resource into the cache
//!
//! Each download lands in its own temporary file next to the cache file and
//! is renamed over it only after a 2xx response, so readers never see a
//! partial file and concurrent downloads of the same file never touch each
//! other's bytes. Any failure removes the temporary file and is reported as
//! a resolution without a path instead of an error.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::app::client::Downloader;

use super::directory::CacheDirectory;
use super::eviction::Evictor;
use super::resolution::Resolution;

/// Whether a fetch may replace an existing file or must only confirm it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Unconditional download of a file that is not cached yet
    Download,
    /// Conditional download of a cached file; 304 means "keep it"
    Revalidate,
}

/// Classified result of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A fresh copy is now in the cache
    Fresh(Resolution),
    /// The origin reported the cached copy as current
    NotModified,
    /// Download failed; the resolution carries no path
    Failed(Resolution),
}

impl FetchOutcome {
    /// The resolution to hand to consumers, if any
    pub fn into_resolution(self) -> Option<Resolution> {
        match self {
            FetchOutcome::Fresh(resolution) | FetchOutcome::Failed(resolution) => Some(resolution),
            FetchOutcome::NotModified => None,
        }
    }
}

/// Downloads resources into the cache directory
#[derive(Debug, Clone)]
pub struct Fetcher {
    directory: CacheDirectory,
    evictor: Evictor,
    downloader: Arc<dyn Downloader>,
}

impl Fetcher {
    /// Create a fetcher writing into `directory`
    pub fn new(directory: CacheDirectory, evictor: Evictor, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            directory,
            evictor,
            downloader,
        }
    }

    /// Download `url` into the cache file `file_name`.
    ///
    /// A plain download of a file that is not cached yet runs an eviction
    /// sweep first, since the write is about to grow the cache.
    pub async fn fetch(
        &self,
        url: &str,
        file_name: &str,
        headers: &HeaderMap,
        mode: FetchMode,
    ) -> FetchOutcome {
        let failed = || FetchOutcome::Failed(Resolution::missing(file_name));

        if let Err(e) = self.directory.ensure_exists().await {
            warn!("Cannot download {}: {}", url, e);
            return failed();
        }

        let target = match self.directory.path_of(file_name) {
            Ok(target) => target,
            Err(e) => {
                warn!("Cannot download {}: {}", url, e);
                return failed();
            }
        };

        if mode == FetchMode::Download && !self.directory.exists(&target).await.unwrap_or(false) {
            self.evictor.sweep().await;
        }

        let temp = match self.directory.temp_file_for(file_name) {
            Ok(temp) => temp,
            Err(e) => {
                warn!("Cannot download {}: {}", url, e);
                return failed();
            }
        };

        debug!("Downloading {} to {}", url, temp.display());
        let response = match self.downloader.download(url, &temp, headers).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Download of {} failed: {}", url, e);
                discard(temp);
                return failed();
            }
        };

        if response.is_success() {
            if let Err(e) = self.directory.persist(temp, &target) {
                warn!("Could not move download into place for {}: {}", url, e);
                return failed();
            }
            info!(
                "Cached {} as {} ({} bytes)",
                url, file_name, response.bytes_written
            );
            return FetchOutcome::Fresh(Resolution::found(target, file_name));
        }

        discard(temp);

        if response.is_not_modified() && mode == FetchMode::Revalidate {
            return FetchOutcome::NotModified;
        }

        if let Some(error) = response.error_for_status() {
            warn!("Download of {} failed: {}", url, error);
        }
        failed()
    }
}

fn discard(temp: TempPath) {
    let path = temp.to_path_buf();
    if let Err(e) = temp.close() {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}
