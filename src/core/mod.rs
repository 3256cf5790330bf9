//! Core functionality for the git-status-cache tool.
//!
//! This module provides the status model, the bucketed on-disk store, the
//! caching façade over a status provider and the CLI presentation helpers.

pub mod aggregate;
pub mod bucket_format;
pub mod bucket_store;
pub mod colors;
pub mod config;
pub mod dirs;
pub mod error;
pub mod events;
pub mod git;
pub mod output;
pub mod provider;
pub mod scheduler;
pub mod status;
pub mod status_cache;

// === Error handling ===
// Core error types and result type used throughout the application
pub use error::{Result, StatusCacheError};

// === Status model ===
// Fourteen-flag bitset and the immutable per-file record
pub use status::{StatusFlags, StatusRecord};

// === Storage ===
// Bucketed binary store and its generation-stamped snapshot
pub use aggregate::{AggregateView, ModifiedFiles};
pub use bucket_store::{BucketStore, DirectoryRecord, RetryPolicy};

// === Status providers ===
// The provider seam, the git2-backed provider and an in-memory one
pub use git::GitStatusProvider;
pub use provider::{MemoryStatusProvider, StatusProvider};

// === Cache façade ===
// Per-file queries, refreshes, notifications and background rescans
pub use events::{ListenerId, StatusChangeEvent, StatusListeners};
pub use scheduler::RescanScheduler;
pub use status_cache::{BatchContext, StatusCache};

// === Configuration ===
pub use config::CacheConfig;

// === Color system ===
// Status badge colouring for CLI output
pub use colors::{aligned_label, colored_path, format_status_line, status_color_style};

// === Output formatting ===
// Unified output formatting for consistent CLI presentation
pub use output::{
    change_summary, print_detail, print_error, print_info, print_section_header, print_success,
};
