//! Consumer locks on cache files
//!
//! A cache file is locked while at least one consumer holds an interest in
//! it. Locked files are exempt from eviction, and a file must be locked by a
//! consumer before that consumer may ask for its resolution stream.
//!
//! The lock sets and the live resolution streams are kept behind a single
//! mutex so that "is this consumer holding a lock" and "fetch or create the
//! stream" happen as one step, and releasing the last lock tears the stream
//! down in the same step.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::{CacheError, CacheResult};

use super::resolution::ResolutionStream;

/// Opaque token identifying one logical consumer of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Wrap a raw id
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ConsumerId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct LockState {
    locks: HashMap<String, HashSet<ConsumerId>>,
    streams: HashMap<String, ResolutionStream>,
}

/// Registry of consumer locks and live resolution streams
#[derive(Debug)]
pub struct LockTable {
    state: Mutex<LockState>,
    next_id: AtomicU64,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hand out a consumer id that is unique for this table
    pub fn next_consumer_id(&self) -> ConsumerId {
        ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add `consumer` to the lock set of `file_name`. Idempotent.
    pub fn acquire(&self, file_name: &str, consumer: ConsumerId) {
        let mut state = self.state.lock();
        let inserted = state
            .locks
            .entry(file_name.to_string())
            .or_default()
            .insert(consumer);
        if inserted {
            debug!("{} locked {}", consumer, file_name);
        }
    }

    /// Remove `consumer` from the lock set of `file_name`.
    ///
    /// When the set becomes empty the entry is pruned and any live
    /// resolution stream for the file is dropped from the registry.
    /// Returns `true` if the file is no longer locked afterwards.
    pub fn release(&self, file_name: &str, consumer: ConsumerId) -> bool {
        let removed_stream = {
            let mut state = self.state.lock();
            let Some(consumers) = state.locks.get_mut(file_name) else {
                return true;
            };
            consumers.remove(&consumer);
            if !consumers.is_empty() {
                return false;
            }

            state.locks.remove(file_name);
            state.streams.remove(file_name)
        };

        debug!("{} released last lock on {}", consumer, file_name);
        if removed_stream.is_some() {
            debug!("Tore down resolution stream for {}", file_name);
        }
        true
    }

    /// Whether any consumer holds a lock on `file_name`
    pub fn is_locked(&self, file_name: &str) -> bool {
        self.state.lock().locks.contains_key(file_name)
    }

    /// Whether `consumer` holds a lock on `file_name`
    pub fn is_locked_by(&self, file_name: &str, consumer: ConsumerId) -> bool {
        self.state
            .lock()
            .locks
            .get(file_name)
            .map(|consumers| consumers.contains(&consumer))
            .unwrap_or(false)
    }

    /// Number of consumers holding `file_name`
    pub fn lock_count(&self, file_name: &str) -> usize {
        self.state
            .lock()
            .locks
            .get(file_name)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Number of locked files
    pub fn locked_files(&self) -> usize {
        self.state.lock().locks.len()
    }

    /// Number of live resolution streams
    pub fn live_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// The live stream for `file_name`, if any
    pub fn live_stream(&self, file_name: &str) -> Option<ResolutionStream> {
        self.state.lock().streams.get(file_name).cloned()
    }

    /// Return the live stream for `file_name`, creating it with `create` if
    /// there is none.
    ///
    /// Fails with [`CacheError::LockRequired`] unless `consumer` currently
    /// holds a lock on the file.
    pub fn stream_for<F>(
        &self,
        file_name: &str,
        consumer: ConsumerId,
        create: F,
    ) -> CacheResult<ResolutionStream>
    where
        F: FnOnce() -> ResolutionStream,
    {
        let mut state = self.state.lock();

        let holds_lock = state
            .locks
            .get(file_name)
            .map(|consumers| consumers.contains(&consumer))
            .unwrap_or(false);
        if !holds_lock {
            return Err(CacheError::LockRequired {
                file_name: file_name.to_string(),
            });
        }

        if let Some(stream) = state.streams.get(file_name) {
            return Ok(stream.clone());
        }

        let stream = create();
        state.streams.insert(file_name.to_string(), stream.clone());
        debug!("Created resolution stream for {}", file_name);
        Ok(stream)
    }
}

/// Scoped lock on a cache file, released on drop
#[derive(Debug)]
pub struct LockGuard {
    table: Arc<LockTable>,
    file_name: String,
    consumer: ConsumerId,
}

impl LockGuard {
    /// Acquire a lock on `file_name` for a fresh consumer
    pub fn acquire(table: Arc<LockTable>, file_name: impl Into<String>) -> Self {
        let consumer = table.next_consumer_id();
        Self::acquire_for(table, file_name, consumer)
    }

    /// Acquire a lock on `file_name` for a given consumer
    pub fn acquire_for(
        table: Arc<LockTable>,
        file_name: impl Into<String>,
        consumer: ConsumerId,
    ) -> Self {
        let file_name = file_name.into();
        table.acquire(&file_name, consumer);
        Self {
            table,
            file_name,
            consumer,
        }
    }

    /// The consumer holding this lock
    pub fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// The locked file
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.table.release(&self.file_name, self.consumer);
    }
}
