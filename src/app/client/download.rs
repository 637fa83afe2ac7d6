//! Streaming file downloads
//!
//! [`Downloader`] is the seam between the cache and the network. The cache
//! only ever sees a status code and a file on disk; how the bytes got there is
//! up to the implementation.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::app::client::http::HttpHandler;
use crate::errors::{DownloadError, DownloadResult};

/// Outcome of a download that reached the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResponse {
    /// HTTP status code of the final response
    pub status: u16,
    /// Bytes written to the destination (0 unless the status was 2xx)
    pub bytes_written: u64,
}

impl DownloadResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the server answered 304 Not Modified
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    /// The status as an error, unless it is 2xx
    pub fn error_for_status(&self) -> Option<DownloadError> {
        if self.is_success() {
            None
        } else {
            Some(DownloadError::ServerError {
                status: self.status,
            })
        }
    }
}

/// Network primitive used by the cache to fetch resources
///
/// A 2xx response writes the body to `destination`; any other status writes
/// nothing. Transport failures are returned as `Err`, and may leave a partial
/// file behind for the caller to clean up.
#[async_trait]
pub trait Downloader: Send + Sync + Debug {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        headers: &HeaderMap,
    ) -> DownloadResult<DownloadResponse>;
}

/// File download operations handler
pub struct DownloadHandler<'a> {
    http_handler: &'a HttpHandler,
}

impl<'a> DownloadHandler<'a> {
    /// Creates a new DownloadHandler with the given HTTP handler
    pub fn new(http_handler: &'a HttpHandler) -> Self {
        Self { http_handler }
    }

    /// Downloads `url` into `destination`, streaming the body chunk by chunk
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails, or
    /// the body cannot be written
    pub async fn download_to(
        &self,
        url: &str,
        destination: &Path,
        headers: &HeaderMap,
    ) -> DownloadResult<DownloadResponse> {
        let parsed_url = parse_url(url)?;
        let mut response = self.http_handler.get_response(&parsed_url, headers).await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            return Ok(DownloadResponse {
                status,
                bytes_written: 0,
            });
        }

        let mut file = File::create(destination).await?;
        let mut bytes_written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(
            "Wrote {} bytes from {} to {}",
            bytes_written,
            url,
            destination.display()
        );

        Ok(DownloadResponse {
            status,
            bytes_written,
        })
    }
}

fn parse_url(url: &str) -> DownloadResult<Url> {
    Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
        url: url.to_string(),
        error: e.to_string(),
    })
}
