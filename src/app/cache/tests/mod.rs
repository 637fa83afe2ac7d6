//! Test support for the cache: an in-memory [`Downloader`] double and the
//! cross-module scenarios that drive [`CacheManager`](super::CacheManager).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;

use crate::app::client::{DownloadResponse, Downloader};
use crate::errors::{DownloadError, DownloadResult};

mod integration_tests;

/// Canned reply of the mock downloader
#[derive(Debug, Clone)]
enum MockReply {
    Status { status: u16, body: Vec<u8> },
    Fail,
}

/// One recorded call to [`MockDownloader::download`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub destination: PathBuf,
    pub headers: HeaderMap,
}

/// Downloader that replays queued replies and records every call
///
/// Replies are used in order; the last one repeats once the queue runs dry.
#[derive(Debug, Default)]
pub struct MockDownloader {
    replies: Mutex<VecDeque<MockReply>>,
    last_reply: Mutex<Option<MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with `status` and `body`
    pub fn respond(self, status: u16, body: &[u8]) -> Self {
        self.replies.lock().push_back(MockReply::Status {
            status,
            body: body.to_vec(),
        });
        self
    }

    /// Queue a transport failure that leaves a partial file behind
    pub fn fail(self) -> Self {
        self.replies.lock().push_back(MockReply::Fail);
        self
    }

    /// Delay every reply, so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of downloads currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        let mut last = self.last_reply.lock();
        if let Some(reply) = self.replies.lock().pop_front() {
            *last = Some(reply.clone());
            return reply;
        }
        last.clone().unwrap_or(MockReply::Status {
            status: 404,
            body: Vec::new(),
        })
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        headers: &HeaderMap,
    ) -> DownloadResult<DownloadResponse> {
        self.calls.lock().push(RecordedCall {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            headers: headers.clone(),
        });
        let reply = self.next_reply();
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        // The body hits the disk before the delay, like a transfer that is
        // still streaming when the reply is decided
        let result = match reply {
            MockReply::Status { status, body } if (200..300).contains(&status) => {
                tokio::fs::write(destination, &body)
                    .await
                    .map(|()| DownloadResponse {
                        status,
                        bytes_written: body.len() as u64,
                    })
                    .map_err(DownloadError::Io)
            }
            MockReply::Status { status, .. } => Ok(DownloadResponse {
                status,
                bytes_written: 0,
            }),
            MockReply::Fail => match tokio::fs::write(destination, b"partial").await {
                Ok(()) => Err(DownloadError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset mid-transfer",
                ))),
                Err(e) => Err(DownloadError::Io(e)),
            },
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
