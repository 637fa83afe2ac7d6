//! Core application logic
//!
//! - [`cache`]: the content-addressed cache, its locks and resolution streams
//! - [`client`]: the network provider the cache downloads through

pub mod cache;
pub mod client;

// Re-export main public API
pub use cache::{
    name_for, CacheConfig, CacheManager, CacheStats, ConsumerId, ImportOptions, ImportResult,
    LockGuard, Resolution, ResolutionStream, Strategy, SweepReport,
};
pub use client::{ClientConfig, DownloadResponse, Downloader, HttpDownloader};
