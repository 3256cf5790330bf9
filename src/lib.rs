//! git-status-cache - a durable cache of per-file version-control status.
//!
//! Status is computed by an expensive [`StatusProvider`] (git, through `git2`)
//! and cached in a small set of hashed binary bucket files, so callers can ask
//! for the status of any file thousands of times per second.
//!
//! # Public API
//! The main public interface is re-exported from the [`core`] module, which provides:
//! - [`StatusRecord`] and [`StatusFlags`], the status model
//! - [`BucketStore`], the on-disk store
//! - [`StatusCache`], the query and refresh façade with change notifications
//! - [`GitStatusProvider`] and [`MemoryStatusProvider`]
//! - Error handling and result types

pub mod commands;
pub mod core;

// Re-export the core public API for external users
pub use core::{
    // Storage
    BucketStore,
    // Cache façade
    BatchContext,
    CacheConfig,
    DirectoryRecord,
    // Providers
    GitStatusProvider,
    ListenerId,
    MemoryStatusProvider,
    ModifiedFiles,
    RescanScheduler,
    // Error handling
    Result,
    RetryPolicy,
    StatusCache,
    StatusCacheError,
    StatusChangeEvent,
    // Status model
    StatusFlags,
    StatusProvider,
    StatusRecord,
};
