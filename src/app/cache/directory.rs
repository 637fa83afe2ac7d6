//! Confined access to the cache directory
//!
//! Every path the cache touches goes through [`CacheDirectory::validate_path`],
//! which resolves the candidate and rejects anything that ends up outside of
//! the cache root. `.` and `..` are resolved lexically; symbolic links are
//! resolved on whatever part of the path already exists on disk. The
//! remaining methods are thin pass-throughs to `tokio::fs` on top of that
//! check.
//!
//! Writes go through a [`TempPath`] unique to the writer, so concurrent
//! writers of the same cache file never share a partial file.

use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tempfile::TempPath;
use tokio::fs;
use tracing::{debug, error};

use crate::constants::TEMP_FILE_SUFFIX;
use crate::errors::{CacheError, CacheResult};

/// A file found while listing the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Cache file name (no directory part)
    pub file_name: String,
    /// Absolute path of the file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

/// Sandboxed view of the cache root directory
#[derive(Debug, Clone)]
pub struct CacheDirectory {
    root: PathBuf,
}

impl CacheDirectory {
    /// Create a facade rooted at `root`
    ///
    /// Relative roots are resolved against the current working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_relative() {
            match std::env::current_dir() {
                Ok(cwd) => cwd.join(root),
                Err(_) => root,
            }
        } else {
            root
        };

        Self {
            root: normalize(&root),
        }
    }

    /// The cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` and confirm it lies inside the cache root.
    ///
    /// Relative candidates are taken relative to the root.
    pub fn validate_path(&self, candidate: impl AsRef<Path>) -> CacheResult<PathBuf> {
        let candidate = candidate.as_ref();
        let joined = if candidate.is_relative() {
            self.root.join(candidate)
        } else {
            candidate.to_path_buf()
        };
        let resolved = normalize(&joined);

        if resolved.starts_with(&self.root) && self.links_stay_inside(&resolved) {
            Ok(resolved)
        } else {
            Err(CacheError::PathTraversal {
                path: candidate.to_path_buf(),
            })
        }
    }

    /// Follow symbolic links on the deepest existing part of `resolved` and
    /// check the real location is still under the real root.
    fn links_stay_inside(&self, resolved: &Path) -> bool {
        let existing = resolved
            .ancestors()
            .take_while(|ancestor| ancestor.starts_with(&self.root))
            .find(|ancestor| std::fs::symlink_metadata(ancestor).is_ok());

        let Some(existing) = existing else {
            // Nothing under the root exists yet, so there are no links to follow
            return true;
        };

        match (
            std::fs::canonicalize(existing),
            std::fs::canonicalize(&self.root),
        ) {
            (Ok(real), Ok(real_root)) => real.starts_with(real_root),
            // Dangling link, or the root vanished in between
            _ => false,
        }
    }

    /// Validated path of a cache file
    pub fn path_of(&self, file_name: &str) -> CacheResult<PathBuf> {
        let path = self.validate_path(file_name)?;
        if path == self.root {
            return Err(CacheError::PathTraversal {
                path: PathBuf::from(file_name),
            });
        }
        Ok(path)
    }

    /// Create an empty temporary file for a write to `file_name`.
    ///
    /// Every call gets its own file, named `<file_name>.<random>.tmp`, which
    /// [`list`](Self::list) skips. The file is removed when the returned path
    /// is dropped without being persisted.
    pub fn temp_file_for(&self, file_name: &str) -> CacheResult<TempPath> {
        self.path_of(file_name)?;

        let temp_file = tempfile::Builder::new()
            .prefix(&format!("{}.", file_name))
            .suffix(TEMP_FILE_SUFFIX)
            .tempfile_in(&self.root)?;
        let temp_path = temp_file.into_temp_path();

        self.validate_path(&temp_path)?;
        Ok(temp_path)
    }

    /// Create the cache root if it does not exist yet
    pub async fn ensure_exists(&self) -> CacheResult<()> {
        if !self.root_exists().await {
            fs::create_dir_all(&self.root).await.map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: self.root.clone(),
                }
            })?;
            debug!("Created cache directory: {}", self.root.display());
        }
        Ok(())
    }

    /// Whether the cache root exists
    pub async fn root_exists(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Whether a path inside the cache exists
    pub async fn exists(&self, path: impl AsRef<Path>) -> CacheResult<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// Metadata of a path inside the cache, `None` if absent
    pub async fn stat(&self, path: impl AsRef<Path>) -> CacheResult<Option<Metadata>> {
        let path = self.validate_path(path)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a file; an already absent file counts as success
    pub async fn unlink(&self, path: impl AsRef<Path>) -> CacheResult<()> {
        let path = self.validate_path(path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy a file into the cache. Only the destination is confined.
    pub async fn copy(&self, from: &Path, to: impl AsRef<Path>) -> CacheResult<u64> {
        let to = self.validate_path(to)?;
        Ok(fs::copy(from, &to).await?)
    }

    /// Move a file into the cache. Only the destination is confined.
    ///
    /// Falls back to copy and delete when a plain rename fails, e.g. across
    /// file systems.
    pub async fn move_file(&self, from: &Path, to: impl AsRef<Path>) -> CacheResult<()> {
        let to = self.validate_path(to)?;
        if fs::rename(from, &to).await.is_ok() {
            return Ok(());
        }

        fs::copy(from, &to).await?;
        if let Err(e) = fs::remove_file(from).await {
            debug!("Could not remove moved source {}: {}", from.display(), e);
        }
        Ok(())
    }

    /// Move a finished temporary file over `to`, replacing the destination
    pub fn persist(&self, temp: TempPath, to: impl AsRef<Path>) -> CacheResult<()> {
        self.validate_path(&temp)?;
        let to = self.validate_path(to)?;
        temp.persist(&to).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    /// List cache files with their size and modification time.
    ///
    /// Subdirectories and in-flight temporary files are skipped, as are
    /// entries that vanish while the listing runs.
    pub async fn list(&self) -> CacheResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let file_name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if file_name.ends_with(TEMP_FILE_SUFFIX) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };

            entries.push(CacheEntry {
                file_name,
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        Ok(entries)
    }

    /// Remove the whole cache tree; an absent tree counts as success
    pub async fn remove_all(&self) -> CacheResult<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
