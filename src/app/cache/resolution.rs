//! Resolution of a resource URL to a local cache file
//!
//! One resolution runs per live stream. It checks the cache file and then:
//!
//! - missing file: download it and emit the outcome
//! - present file, [`Strategy::Immutable`]: emit the local path, no network
//! - present file, [`Strategy::Mutable`]: emit the local path, revalidate
//!   with `If-Modified-Since`, and emit again only if a fresh copy arrived

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::constants::http::HTTP_DATE_FORMAT;

use super::config::Strategy;
use super::directory::CacheDirectory;
use super::fetch::{FetchMode, FetchOutcome, Fetcher};
use super::stream::{Emitter, ReplayStream};

/// Result of resolving a URL: the local file, or `None` if it failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Local path of the cached file, `None` when resolution failed
    pub path: Option<PathBuf>,
    /// Cache file name the resolution is for
    pub file_name: String,
}

impl Resolution {
    /// A resolution pointing at a local file
    pub fn found(path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            file_name: file_name.into(),
        }
    }

    /// A failed resolution
    pub fn missing(file_name: impl Into<String>) -> Self {
        Self {
            path: None,
            file_name: file_name.into(),
        }
    }

    /// Whether a local file is available
    pub fn is_resolved(&self) -> bool {
        self.path.is_some()
    }

    /// The path as a `file://` URI
    pub fn uri(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(|path| Url::from_file_path(path).ok())
            .map(String::from)
    }
}

/// Shared stream of resolutions for one cache file
pub type ResolutionStream = ReplayStream<Resolution>;

/// Everything a resolution needs, owned so it can run on a spawned task
#[derive(Debug, Clone)]
pub(crate) struct ResolveTask {
    pub url: String,
    pub file_name: String,
    pub strategy: Strategy,
    pub headers: HeaderMap,
    pub directory: CacheDirectory,
    pub fetcher: Fetcher,
}

impl ResolveTask {
    /// Run the resolution, emitting into `emitter`
    pub(crate) async fn run(self, emitter: Emitter<Resolution>) {
        let target = match self.directory.path_of(&self.file_name) {
            Ok(path) => path,
            Err(e) => {
                warn!("Refusing to resolve {}: {}", self.file_name, e);
                emitter.emit(Resolution::missing(&self.file_name));
                return;
            }
        };

        let metadata = match self.directory.stat(&target).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Could not stat {}: {}", target.display(), e);
                None
            }
        };

        let Some(metadata) = metadata else {
            debug!("Cache miss for {}", self.url);
            let outcome = self
                .fetcher
                .fetch(&self.url, &self.file_name, &self.headers, FetchMode::Download)
                .await;
            let resolution = match outcome {
                FetchOutcome::Fresh(resolution) | FetchOutcome::Failed(resolution) => resolution,
                FetchOutcome::NotModified => Resolution::missing(&self.file_name),
            };
            emitter.emit(resolution);
            return;
        };

        debug!("Cache hit for {} ({})", self.url, self.strategy);
        emitter.emit(Resolution::found(&target, &self.file_name));

        if self.strategy == Strategy::Immutable {
            return;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let headers = revalidation_headers(&self.headers, modified);
        match self
            .fetcher
            .fetch(&self.url, &self.file_name, &headers, FetchMode::Revalidate)
            .await
        {
            FetchOutcome::Fresh(resolution) => {
                debug!("Revalidation of {} downloaded a fresh copy", self.url);
                emitter.emit(resolution);
            }
            FetchOutcome::NotModified => {
                debug!("{} not modified", self.url);
            }
            FetchOutcome::Failed(_) => {
                warn!(
                    "Revalidation of {} failed, keeping cached copy at {}",
                    self.url,
                    target.display()
                );
            }
        }
    }
}

/// Caller headers plus `If-Modified-Since` for the given modification time
pub fn revalidation_headers(headers: &HeaderMap, modified: SystemTime) -> HeaderMap {
    let mut headers = headers.clone();
    if let Ok(value) = HeaderValue::from_str(&http_date(modified)) {
        headers.insert(IF_MODIFIED_SINCE, value);
    }
    headers
}

/// Format a time as an HTTP-date
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format(HTTP_DATE_FORMAT)
        .to_string()
}
