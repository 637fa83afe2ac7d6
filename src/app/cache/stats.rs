//! Cache statistics and disk usage
//!
//! Everything here is derived from a directory listing and the lock table;
//! the cache keeps no index of its own.

use std::path::PathBuf;

use serde::Serialize;

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Cache root directory
    pub cache_root: PathBuf,
    /// Number of files cached on disk
    pub cached_files_count: usize,
    /// Total size of cached files in bytes
    pub total_cache_size: u64,
    /// Configured budget in bytes (0 = unlimited)
    pub max_cache_size: u64,
    /// Number of files with at least one consumer lock
    pub locked_files: usize,
    /// Number of live resolution streams
    pub live_streams: usize,
}

impl CacheStats {
    /// Create empty statistics for a cache root
    pub fn new(cache_root: PathBuf, max_cache_size: u64) -> Self {
        Self {
            cache_root,
            cached_files_count: 0,
            total_cache_size: 0,
            max_cache_size,
            locked_files: 0,
            live_streams: 0,
        }
    }

    /// Update disk usage
    pub fn set_disk_stats(&mut self, cached_files_count: usize, total_cache_size: u64) {
        self.cached_files_count = cached_files_count;
        self.total_cache_size = total_cache_size;
    }

    /// Update lock and stream counts
    pub fn set_lock_stats(&mut self, locked_files: usize, live_streams: usize) {
        self.locked_files = locked_files;
        self.live_streams = live_streams;
    }

    /// Cache usage as percentage of the budget; 0 when unlimited
    pub fn usage_percentage(&self) -> f64 {
        if self.max_cache_size == 0 {
            return 0.0;
        }
        (self.total_cache_size as f64 / self.max_cache_size as f64) * 100.0
    }

    /// Whether the cache currently exceeds its budget
    pub fn is_over_budget(&self) -> bool {
        self.max_cache_size > 0 && self.total_cache_size > self.max_cache_size
    }

    /// Format cache size in human-readable format
    pub fn format_cache_size(&self) -> String {
        format_bytes(self.total_cache_size)
    }

    /// Format the budget in human-readable format
    pub fn format_budget(&self) -> String {
        if self.max_cache_size == 0 {
            "unlimited".to_string()
        } else {
            format_bytes(self.max_cache_size)
        }
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
