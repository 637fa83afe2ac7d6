//! Core HTTP operations with rate limiting and retry logic
//!
//! Requests are paced by a `governor` rate limiter. 429 and 503 responses are
//! retried with exponential backoff up to the configured number of retries;
//! every other response, successful or not, is handed back to the caller.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use url::Url;

use crate::constants::limits;
use crate::errors::{DownloadError, DownloadResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
    max_retries: u32,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::InvalidRateLimit` if `rate_limit_rps` is zero
    pub fn new(client: Client, rate_limit_rps: u32, max_retries: u32) -> DownloadResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            max_retries,
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> DownloadResult<DirectRateLimiter> {
        let rate = NonZeroU32::new(rate_limit_rps).ok_or_else(|| DownloadError::InvalidRateLimit {
            reason: "Rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rate)))
    }

    /// Sends a GET request with the given headers
    ///
    /// Non-success statuses other than 429/503 are returned as responses, not
    /// errors; classifying them is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, or when 429/503 persists
    /// after all retries
    pub async fn get_response(&self, url: &Url, headers: &HeaderMap) -> DownloadResult<Response> {
        let mut retries = 0;
        loop {
            // Jitter avoids a thundering herd when many resolutions start at once
            self.rate_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;

            let response = self
                .client
                .get(url.as_str())
                .headers(headers.clone())
                .send()
                .await?;

            let status = response.status();
            if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE
            {
                tracing::debug!("HTTP {} for {}", status.as_u16(), url);
                return Ok(response);
            }

            if retries >= self.max_retries {
                return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                    DownloadError::RateLimitExceeded
                } else {
                    DownloadError::ServerOverloaded
                });
            }

            retries += 1;
            let delay = backoff_delay(retries);
            tracing::warn!(
                "Server responded with HTTP {} for {}. Backing off for {}ms",
                status.as_u16(),
                url,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Exponential backoff delay for the given retry attempt (1-based)
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(limits::RETRY_BASE_DELAY_MS.saturating_mul(2_u64.saturating_pow(attempt)))
}
