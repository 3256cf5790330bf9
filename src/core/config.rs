//! User configuration of the cache.
//!
//! Read from `config.json` in the user configuration directory when present;
//! every field is optional and falls back to its default.

use crate::core::bucket_store::RetryPolicy;
use crate::core::dirs::{cache_directory, config_directory};
use crate::core::error::{Result, StatusCacheError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the bucket files; derived from the working tree when unset.
    pub cache_root: Option<PathBuf>,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            cache_root: None,
            retry_attempts: retry.attempts,
            retry_backoff_ms: retry.backoff.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    /// Load the user's configuration, or the defaults if there is none.
    pub fn load_or_default() -> Result<Self> {
        match config_directory() {
            Ok(dir) => Self::load_from(&dir.join(CONFIG_FILE)),
            Err(e) => {
                log::debug!("No configuration directory ({e}); using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No configuration at '{}'; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| StatusCacheError::config_parse_failed(path, e))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Store directory for the working tree rooted at `worktree`.
    ///
    /// Each working tree gets its own subdirectory, named after the MD5 of its path.
    pub fn cache_root_for(&self, worktree: &Path) -> Result<PathBuf> {
        let base = match &self.cache_root {
            Some(root) => root.clone(),
            None => cache_directory()?,
        };
        let tree_hash = format!("{:x}", md5::compute(worktree.to_string_lossy().as_bytes()));
        log::debug!("Cache root for '{}': {}/{tree_hash}", worktree.display(), base.display());
        Ok(base.join(tree_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let config = CacheConfig::load_from(&temp.path().join(CONFIG_FILE))?;
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, r#"{ "retry_attempts": 3 }"#)?;

        let config = CacheConfig::load_from(&path)?;
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_backoff_ms, 30);
        assert!(config.cache_root.is_none());
        Ok(())
    }

    #[test]
    fn test_corrupted_file_is_reported() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json")?;

        let err = CacheConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, StatusCacheError::ConfigParseFailed { .. }));
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("nested").join(CONFIG_FILE);
        let config = CacheConfig {
            cache_root: Some(temp.path().join("store")),
            retry_attempts: 2,
            retry_backoff_ms: 5,
        };
        config.save_to(&path)?;
        assert_eq!(CacheConfig::load_from(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_cache_root_is_per_worktree() -> Result<()> {
        let temp = TempDir::new()?;
        let config = CacheConfig {
            cache_root: Some(temp.path().to_path_buf()),
            ..CacheConfig::default()
        };

        let first = config.cache_root_for(Path::new("/work/one"))?;
        let second = config.cache_root_for(Path::new("/work/two"))?;
        assert_ne!(first, second);
        assert!(first.starts_with(temp.path()));
        assert_eq!(first, config.cache_root_for(Path::new("/work/one"))?);
        Ok(())
    }
}
