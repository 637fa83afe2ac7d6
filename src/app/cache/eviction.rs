//! Size-bounded eviction of cache files
//!
//! A sweep lists the cache directory, and if the files add up to more than
//! the budget, deletes the oldest ones (by modification time) until the
//! overflow is gone. Files locked by a consumer are never deleted, even when
//! that leaves the cache above budget.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::directory::{CacheDirectory, CacheEntry};
use super::lock::LockTable;

/// What a sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Total size before the sweep
    pub total_before: u64,
    /// Files that were deleted
    pub evicted: Vec<String>,
    /// Bytes freed by the deletions that succeeded
    pub bytes_freed: u64,
    /// Locked files that were passed over
    pub skipped_locked: usize,
}

impl SweepReport {
    /// Whether anything was deleted
    pub fn is_noop(&self) -> bool {
        self.evicted.is_empty()
    }
}

enum Eviction {
    Deleted,
    Locked,
    Failed,
}

/// Enforces the cache budget
#[derive(Debug, Clone)]
pub struct Evictor {
    directory: CacheDirectory,
    locks: Arc<LockTable>,
    max_cache_size: u64,
}

impl Evictor {
    /// Create an evictor; a `max_cache_size` of 0 disables eviction
    pub fn new(directory: CacheDirectory, locks: Arc<LockTable>, max_cache_size: u64) -> Self {
        Self {
            directory,
            locks,
            max_cache_size,
        }
    }

    /// The configured budget in bytes
    pub fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    /// Run one sweep. Individual delete failures are ignored.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        if self.max_cache_size == 0 || !self.directory.root_exists().await {
            return report;
        }

        let entries = match self.directory.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not list cache directory for eviction: {}", e);
                return report;
            }
        };

        report.total_before = entries.iter().map(|entry| entry.size).sum();
        if report.total_before <= self.max_cache_size {
            return report;
        }

        let victims = self.select_victims(entries, &mut report);

        let deletions = victims.iter().map(|entry| self.evict(entry));
        let results = join_all(deletions).await;

        for (entry, result) in victims.into_iter().zip(results) {
            match result {
                Eviction::Deleted => {
                    report.bytes_freed += entry.size;
                    report.evicted.push(entry.file_name);
                }
                Eviction::Locked => report.skipped_locked += 1,
                Eviction::Failed => {}
            }
        }

        info!(
            "Eviction sweep freed {} bytes across {} files ({} locked files skipped)",
            report.bytes_freed,
            report.evicted.len(),
            report.skipped_locked
        );
        report
    }

    /// Delete one victim, unless a consumer locked it after it was picked
    async fn evict(&self, entry: &CacheEntry) -> Eviction {
        if self.locks.is_locked(&entry.file_name) {
            debug!("{} was locked before eviction, keeping it", entry.file_name);
            return Eviction::Locked;
        }

        match self.directory.unlink(&entry.path).await {
            Ok(()) => Eviction::Deleted,
            Err(e) => {
                debug!("Could not evict {}: {}", entry.file_name, e);
                Eviction::Failed
            }
        }
    }

    /// Pick the oldest unlocked entries that cover the overflow.
    fn select_victims(&self, mut entries: Vec<CacheEntry>, report: &mut SweepReport) -> Vec<CacheEntry> {
        // Stable sort keeps listing order for equal timestamps
        entries.sort_by_key(|entry| entry.modified);

        let mut overflow = report.total_before.saturating_sub(self.max_cache_size);
        let mut victims = Vec::new();

        for entry in entries {
            if overflow == 0 {
                break;
            }
            if self.locks.is_locked(&entry.file_name) {
                report.skipped_locked += 1;
                continue;
            }
            if self.directory.validate_path(&entry.path).is_err() {
                continue;
            }

            debug!("Evicting {} ({} bytes)", entry.file_name, entry.size);
            overflow = overflow.saturating_sub(entry.size);
            victims.push(entry);
        }

        victims
    }
}
