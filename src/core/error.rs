//! Domain-specific error types and error handling utilities.
//!
//! This module defines [`StatusCacheError`] which covers every failure mode of the
//! status cache: bucket file I/O, on-disk corruption, status provider failures and
//! configuration problems. It uses `thiserror` for ergonomic error definitions and
//! includes constructors for the common failure scenarios.
//!
//! # Public API
//! - [`StatusCacheError`]: Main error enum covering all failure modes
//! - [`Result<T>`]: Type alias for `std::result::Result<T, StatusCacheError>`
//!
//! # Error Categories
//! - **Repository errors**: working tree not found, git2 library errors
//! - **Bucket store errors**: exhausted open retries, corrupt records, failed rewrites
//! - **Provider errors**: the external status computation failed
//! - **Configuration errors**: cache directory resolution, config parsing

use std::path::PathBuf;
use thiserror::Error;

/// Domain-specific error types for the status cache
#[derive(Error, Debug)]
pub enum StatusCacheError {
    // Repository errors
    #[error("Not in a git repository")]
    NotInGitRepo,

    #[error("Git repository error: {0}")]
    GitRepo(#[from] git2::Error),

    #[error("Invalid UTF-8 path in repository")]
    InvalidUtf8Path,

    #[error("Path is outside the working tree: {path}")]
    OutsideWorkingTree { path: PathBuf },

    // File operation errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Bucket store errors
    #[error("Bucket file '{path}' could not be opened after {attempts} attempts: {source}")]
    BucketOpenFailed {
        path: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    #[error("Corrupt record in bucket file '{path}': {reason}")]
    CorruptBucket { path: PathBuf, reason: String },

    #[error("Failed to rewrite bucket file '{path}': {source}")]
    BucketWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    // Provider errors
    #[error("Status provider failed for '{path}': {message}")]
    ProviderFailed { path: PathBuf, message: String },

    // Configuration errors
    #[error("Could not find cache directory")]
    CacheDirectoryNotFound,

    #[error("Failed to create cache directory '{path}': {source}")]
    CacheDirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    // JSON serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results using StatusCacheError
pub type Result<T> = std::result::Result<T, StatusCacheError>;

impl StatusCacheError {
    /// Create an error for a path that does not belong to the working tree
    pub fn outside_working_tree(path: impl Into<PathBuf>) -> Self {
        Self::OutsideWorkingTree { path: path.into() }
    }

    /// Create a bucket open failure after the retry budget was spent
    pub fn bucket_open_failed(
        path: impl Into<PathBuf>,
        attempts: u32,
        source: std::io::Error,
    ) -> Self {
        Self::BucketOpenFailed {
            path: path.into(),
            attempts,
            source,
        }
    }

    /// Create a corrupt bucket error
    pub fn corrupt_bucket(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptBucket {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a bucket rewrite failure
    pub fn bucket_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::BucketWriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a provider failure with a message
    pub fn provider_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProviderFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a cache directory creation failed error
    pub fn cache_directory_creation_failed(
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::CacheDirectoryCreationFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a config parse failed error
    pub fn config_parse_failed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::ConfigParseFailed {
            path: path.into(),
            source,
        }
    }
}
