//! HTTP client used by the cache to fetch remote resources
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: request execution with rate limiting and 429/503 backoff
//! - `download`: the [`Downloader`] trait and streaming writes to disk

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::errors::DownloadResult;

pub mod config;
pub mod download;
pub mod http;

pub use config::ClientConfig;
pub use download::{DownloadResponse, Downloader};

use download::DownloadHandler;
use http::HttpHandler;

/// reqwest-backed [`Downloader`]
#[derive(Debug)]
pub struct HttpDownloader {
    http_handler: HttpHandler,
}

impl HttpDownloader {
    /// Creates a downloader with default settings
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the HTTP client cannot be built
    pub fn new() -> DownloadResult<Self> {
        Self::with_config(&ClientConfig::default())
    }

    /// Creates a downloader with custom configuration
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the HTTP client cannot be built or the rate
    /// limit is zero
    pub fn with_config(config: &ClientConfig) -> DownloadResult<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps, config.max_retries)?;

        tracing::debug!(
            "Created HTTP downloader ({} req/s, {} retries)",
            config.rate_limit_rps,
            config.max_retries
        );

        Ok(Self { http_handler })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        headers: &HeaderMap,
    ) -> DownloadResult<DownloadResponse> {
        DownloadHandler::new(&self.http_handler)
            .download_to(url, destination, headers)
            .await
    }
}
