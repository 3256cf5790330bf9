//! CLI subcommands.
//!
//! Every command works on the working tree containing the current directory
//! and opens the cache through [`CacheContext::open`].

pub mod clear;
pub mod modified;
pub mod refresh;
pub mod scan;
pub mod status;

pub use clear::*;
pub use modified::*;
pub use refresh::*;
pub use scan::*;
pub use status::*;

use crate::core::{BucketStore, CacheConfig, GitStatusProvider, Result, StatusCache, StatusRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opened cache for the working tree around the current directory.
pub struct CacheContext {
    pub worktree: PathBuf,
    pub cwd: PathBuf,
    pub cache: Arc<StatusCache>,
}

impl CacheContext {
    /// `cache_dir` overrides the configured base directory of the store.
    pub fn open(cache_dir: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?.canonicalize()?;
        let worktree = GitStatusProvider::working_tree_root(&cwd)?;

        let mut config = CacheConfig::load_or_default()?;
        if let Some(dir) = cache_dir {
            config.cache_root = Some(dir.to_path_buf());
        }
        let root = config.cache_root_for(&worktree)?;
        log::debug!("Using cache directory: {}", root.display());

        let store = BucketStore::with_retry_policy(root, config.retry_policy());
        let cache = StatusCache::new(store, Arc::new(GitStatusProvider::new()));
        Ok(Self {
            worktree,
            cwd,
            cache: Arc::new(cache),
        })
    }

    /// Absolute, canonical form of a path given on the command line.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let joined = self.cwd.join(path);
        if let Ok(canonical) = joined.canonicalize() {
            return canonical;
        }
        // Deleted files: canonicalize what is left of the path
        match (joined.parent(), joined.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|parent| parent.join(name))
                .unwrap_or(joined),
            _ => joined,
        }
    }

    /// Path as shown to the user, relative to the working tree root.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.worktree)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Most important first, then by path.
pub fn sort_by_importance(entries: &mut [(PathBuf, StatusRecord)]) {
    entries.sort_by(|(a_path, a), (b_path, b)| {
        b.importance()
            .cmp(&a.importance())
            .then_with(|| a_path.cmp(b_path))
    });
}
