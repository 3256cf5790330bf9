//! The status provider seam.
//!
//! Computing status is expensive and owned by the version-control backend; the
//! cache only ever talks to it through [`StatusProvider`]. Two implementations
//! ship with the crate:
//!
//! - [`GitStatusProvider`](crate::core::git::GitStatusProvider) -- backed by `git2`
//! - [`MemoryStatusProvider`] -- table-driven, for tests and embedding

use crate::core::error::{Result, StatusCacheError};
use crate::core::status::{StatusFlags, StatusRecord};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// Capability that computes version-control status on demand.
///
/// Calls may block for a long time; the cache never holds its lock across them.
pub trait StatusProvider: Send + Sync {
    /// Status of every immediate child of `dir` that is not plainly up to date.
    ///
    /// Children missing from the result are up to date.
    fn directory_status(&self, dir: &Path) -> Result<HashMap<PathBuf, StatusRecord>>;

    /// Status of one path. `repo_hint` names the working tree root when the caller knows it.
    fn file_status(&self, file: &Path, repo_hint: Option<&Path>) -> Result<StatusRecord>;

    /// Status of many paths in one call.
    fn batch_status(&self, files: &[PathBuf]) -> Result<HashMap<PathBuf, StatusRecord>> {
        files
            .iter()
            .map(|file| Ok((file.clone(), self.file_status(file, None)?)))
            .collect()
    }

    /// Whether `path` lies inside a working tree.
    fn is_managed(&self, path: &Path) -> bool;

    /// Whether `path` is ignored by its working tree.
    fn is_ignored(&self, path: &Path) -> bool;

    /// Root of the working tree containing `path`.
    fn repository_root(&self, path: &Path) -> Option<PathBuf>;
}

/// Table-driven provider.
///
/// Paths under a registered root are managed; explicit statuses win, ignored
/// paths (and everything beneath them) are excluded, anything else that exists
/// on disk is up to date. Counts its calls so callers can assert on cache hits.
#[derive(Debug, Default)]
pub struct MemoryStatusProvider {
    roots: RwLock<Vec<PathBuf>>,
    ignored: RwLock<HashSet<PathBuf>>,
    statuses: RwLock<HashMap<PathBuf, StatusRecord>>,
    failing: AtomicBool,
    failing_directories: AtomicBool,
    directory_calls: AtomicUsize,
    file_calls: AtomicUsize,
}

impl MemoryStatusProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with a single working tree rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let provider = Self::new();
        provider.add_root(root);
        provider
    }

    pub fn add_root(&self, root: impl Into<PathBuf>) {
        write_lock(&self.roots).push(root.into());
    }

    pub fn set_status(&self, path: impl Into<PathBuf>, record: StatusRecord) {
        write_lock(&self.statuses).insert(path.into(), record);
    }

    pub fn clear_status(&self, path: &Path) {
        write_lock(&self.statuses).remove(path);
    }

    pub fn set_ignored(&self, path: impl Into<PathBuf>, ignored: bool) {
        let path = path.into();
        let mut set = write_lock(&self.ignored);
        if ignored {
            set.insert(path);
        } else {
            set.remove(&path);
        }
    }

    /// Make every status computation fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `directory_status` fail; single-file queries keep working.
    pub fn set_directories_failing(&self, failing: bool) {
        self.failing_directories.store(failing, Ordering::SeqCst);
    }

    pub fn directory_calls(&self) -> usize {
        self.directory_calls.load(Ordering::SeqCst)
    }

    pub fn file_calls(&self) -> usize {
        self.file_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self, path: &Path) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StatusCacheError::provider_failed(path, "provider switched to failing"));
        }
        Ok(())
    }

    fn compute(&self, path: &Path) -> StatusRecord {
        let is_directory = path.is_dir();
        if !self.is_managed(path) {
            return StatusRecord::new(StatusFlags::NOT_MANAGED, is_directory);
        }
        if let Some(record) = read_lock(&self.statuses).get(path) {
            return *record;
        }
        if self.is_ignored(path) {
            return StatusRecord::new(StatusFlags::EXCLUDED, is_directory);
        }
        if path.exists() {
            StatusRecord::new(StatusFlags::UP_TO_DATE, is_directory)
        } else {
            StatusRecord::UNKNOWN
        }
    }
}

impl StatusProvider for MemoryStatusProvider {
    fn directory_status(&self, dir: &Path) -> Result<HashMap<PathBuf, StatusRecord>> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(dir)?;
        if self.failing_directories.load(Ordering::SeqCst) {
            return Err(StatusCacheError::provider_failed(dir, "directory listing switched to failing"));
        }

        let mut children: HashSet<PathBuf> = read_lock(&self.statuses)
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                children.insert(entry.path());
            }
        }

        Ok(children
            .into_iter()
            .map(|child| {
                let record = self.compute(&child);
                (child, record)
            })
            .filter(|(_, record)| !record.is_up_to_date())
            .collect())
    }

    fn file_status(&self, file: &Path, _repo_hint: Option<&Path>) -> Result<StatusRecord> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(file)?;
        Ok(self.compute(file))
    }

    fn is_managed(&self, path: &Path) -> bool {
        !is_git_metadata(path) && self.repository_root(path).is_some()
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let ignored = read_lock(&self.ignored);
        path.ancestors().any(|ancestor| ignored.contains(ancestor))
    }

    fn repository_root(&self, path: &Path) -> Option<PathBuf> {
        read_lock(&self.roots)
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }
}

/// Whether `path` lies inside version-control metadata.
pub fn is_git_metadata(path: &Path) -> bool {
    path.components().any(|component| component.as_os_str() == ".git")
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}
