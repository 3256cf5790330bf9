//! Version-control status flags and the immutable per-file status record.
//!
//! A file's status is a bitset of fourteen flags rather than a single enum value:
//! a file can be added locally *and* modified, or up to date locally while a newer
//! revision exists in the repository. [`StatusRecord`] pairs that bitset with a
//! directory flag and is the unit the cache stores and compares.
//!
//! # Public API
//! - [`StatusFlags`]: the bitset, its named flags and derived query masks
//! - [`StatusRecord`]: immutable `(flags, is_directory)` value
//!
//! # Key Features
//! - **Valuable mask**: decides what is worth persisting
//! - **Importance ordering**: dominant flag used for badges and sorting
//! - **git2 integration**: direct conversion from `git2::Status`
//! - **Wire code**: `u32` encoding used by the bucket file format

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Bitset of version-control status flags.
///
/// The empty set is the `Unknown` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusFlags(u16);

impl StatusFlags {
    pub const UNKNOWN: StatusFlags = StatusFlags(0);
    pub const NOT_MANAGED: StatusFlags = StatusFlags(1 << 0);
    pub const EXCLUDED: StatusFlags = StatusFlags(1 << 1);
    pub const NEW_LOCALLY: StatusFlags = StatusFlags(1 << 2);
    pub const UP_TO_DATE: StatusFlags = StatusFlags(1 << 3);
    pub const MODIFIED_LOCALLY: StatusFlags = StatusFlags(1 << 4);
    pub const MODIFIED_IN_REPOSITORY: StatusFlags = StatusFlags(1 << 5);
    pub const CONFLICT: StatusFlags = StatusFlags(1 << 6);
    pub const MERGE: StatusFlags = StatusFlags(1 << 7);
    pub const REMOVED_LOCALLY: StatusFlags = StatusFlags(1 << 8);
    pub const NEW_IN_REPOSITORY: StatusFlags = StatusFlags(1 << 9);
    pub const REMOVED_IN_REPOSITORY: StatusFlags = StatusFlags(1 << 10);
    pub const DELETED_LOCALLY: StatusFlags = StatusFlags(1 << 11);
    pub const ADDED_LOCALLY: StatusFlags = StatusFlags(1 << 12);
    pub const COPIED_LOCALLY: StatusFlags = StatusFlags(1 << 13);

    /// Every defined flag.
    pub const ALL: StatusFlags = StatusFlags((1 << 14) - 1);

    /// Everything the version-control system knows about, ignored files included.
    pub const MANAGED: StatusFlags = StatusFlags(Self::ALL.0 & !Self::NOT_MANAGED.0);

    /// Statuses worth persisting: managed and not up to date.
    pub const VALUABLE: StatusFlags = StatusFlags(Self::MANAGED.0 & !Self::UP_TO_DATE.0);

    pub const LOCALLY_CHANGED: StatusFlags = StatusFlags(
        Self::NEW_LOCALLY.0
            | Self::MODIFIED_LOCALLY.0
            | Self::CONFLICT.0
            | Self::MERGE.0
            | Self::REMOVED_LOCALLY.0
            | Self::DELETED_LOCALLY.0
            | Self::ADDED_LOCALLY.0
            | Self::COPIED_LOCALLY.0,
    );

    pub const REMOTE_CHANGE: StatusFlags = StatusFlags(
        Self::MODIFIED_IN_REPOSITORY.0 | Self::NEW_IN_REPOSITORY.0 | Self::REMOVED_IN_REPOSITORY.0,
    );

    /// Flags whose gain or loss on a directory changes the meaning of its whole subtree.
    pub const SUBTREE_SCOPED: StatusFlags = StatusFlags(Self::EXCLUDED.0 | Self::NOT_MANAGED.0);

    /// Flags in descending importance; a record ranks by its first hit.
    const IMPORTANCE: [StatusFlags; 14] = [
        Self::CONFLICT,
        Self::MERGE,
        Self::DELETED_LOCALLY,
        Self::REMOVED_LOCALLY,
        Self::ADDED_LOCALLY,
        Self::COPIED_LOCALLY,
        Self::MODIFIED_LOCALLY,
        Self::NEW_LOCALLY,
        Self::REMOVED_IN_REPOSITORY,
        Self::NEW_IN_REPOSITORY,
        Self::MODIFIED_IN_REPOSITORY,
        Self::UP_TO_DATE,
        Self::EXCLUDED,
        Self::NOT_MANAGED,
    ];

    /// Build a bitset from raw bits, dropping anything outside the defined flags.
    pub const fn from_bits_truncate(bits: u16) -> Self {
        StatusFlags(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every flag of `other` is set.
    pub const fn contains(self, other: StatusFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when at least one flag of `other` is set.
    pub const fn intersects(self, other: StatusFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: StatusFlags) -> Self {
        StatusFlags(self.0 | other.0)
    }

    pub const fn difference(self, other: StatusFlags) -> Self {
        StatusFlags(self.0 & !other.0)
    }

    /// Flags set in exactly one of the two sets.
    pub const fn symmetric_difference(self, other: StatusFlags) -> Self {
        StatusFlags(self.0 ^ other.0)
    }

    /// The most important flag present, or `UNKNOWN` for the empty set.
    pub fn dominant(self) -> StatusFlags {
        Self::IMPORTANCE
            .iter()
            .copied()
            .find(|flag| self.contains(*flag))
            .unwrap_or(Self::UNKNOWN)
    }

    /// Importance rank: higher is more important, `0` is `Unknown`.
    pub fn importance(self) -> u8 {
        match Self::IMPORTANCE.iter().position(|flag| self.contains(*flag)) {
            Some(index) => (Self::IMPORTANCE.len() - index) as u8,
            None => 0,
        }
    }
}

impl BitOr for StatusFlags {
    type Output = StatusFlags;

    fn bitor(self, rhs: StatusFlags) -> StatusFlags {
        self.union(rhs)
    }
}

impl BitAnd for StatusFlags {
    type Output = StatusFlags;

    fn bitand(self, rhs: StatusFlags) -> StatusFlags {
        StatusFlags(self.0 & rhs.0)
    }
}

/// Bit of the on-disk status code that marks a directory entry.
pub const DIRECTORY_BIT: u32 = 1 << 16;

/// Status of one file or directory.
///
/// Equality is value equality over both fields; two records are "equivalent"
/// exactly when they compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: StatusFlags,
    pub is_directory: bool,
}

impl StatusRecord {
    pub const UNKNOWN: StatusRecord = StatusRecord::file(StatusFlags::UNKNOWN);

    pub const fn new(status: StatusFlags, is_directory: bool) -> Self {
        Self {
            status,
            is_directory,
        }
    }

    pub const fn file(status: StatusFlags) -> Self {
        Self::new(status, false)
    }

    pub const fn directory(status: StatusFlags) -> Self {
        Self::new(status, true)
    }

    /// Same directory flag, different status.
    pub const fn with_status(self, status: StatusFlags) -> Self {
        Self::new(status, self.is_directory)
    }

    pub fn equivalent(&self, other: &StatusRecord) -> bool {
        self == other
    }

    pub fn is_unknown(&self) -> bool {
        self.status.is_empty()
    }

    pub fn is_managed(&self) -> bool {
        self.status.intersects(StatusFlags::MANAGED)
    }

    pub fn is_valuable(&self) -> bool {
        self.status.intersects(StatusFlags::VALUABLE)
    }

    /// Exactly up to date, nothing else set.
    pub fn is_up_to_date(&self) -> bool {
        self.status == StatusFlags::UP_TO_DATE
    }

    /// Whether a directory record may keep this entry on disk.
    ///
    /// Valuable entries always qualify; managed directory placeholders
    /// (nested working tree roots) qualify even when up to date.
    pub fn is_persistable(&self) -> bool {
        self.is_valuable() || (self.is_directory && self.is_managed())
    }

    /// Encode for the bucket file: low 16 bits status, bit 16 directory.
    pub fn to_code(&self) -> u32 {
        let dir = if self.is_directory { DIRECTORY_BIT } else { 0 };
        u32::from(self.status.bits()) | dir
    }

    pub fn from_code(code: u32) -> Self {
        Self::new(
            StatusFlags::from_bits_truncate((code & 0xFFFF) as u16),
            code & DIRECTORY_BIT != 0,
        )
    }

    /// Convert git2 status flags for a path into a record.
    pub fn from_git2(flags: git2::Status, is_directory: bool) -> Self {
        let mut status = StatusFlags::UNKNOWN;

        if flags.contains(git2::Status::CONFLICTED) {
            status = status | StatusFlags::CONFLICT;
        }
        if flags.contains(git2::Status::IGNORED) {
            status = status | StatusFlags::EXCLUDED;
        }
        if flags.contains(git2::Status::WT_NEW) {
            status = status | StatusFlags::NEW_LOCALLY;
        }
        if flags.contains(git2::Status::INDEX_NEW) {
            status = status | StatusFlags::ADDED_LOCALLY;
        }
        if flags.intersects(
            git2::Status::INDEX_MODIFIED
                | git2::Status::WT_MODIFIED
                | git2::Status::INDEX_TYPECHANGE
                | git2::Status::WT_TYPECHANGE,
        ) {
            status = status | StatusFlags::MODIFIED_LOCALLY;
        }
        if flags.contains(git2::Status::INDEX_DELETED) {
            status = status | StatusFlags::REMOVED_LOCALLY;
        }
        if flags.contains(git2::Status::WT_DELETED) {
            status = status | StatusFlags::DELETED_LOCALLY;
        }
        if flags.intersects(git2::Status::INDEX_RENAMED | git2::Status::WT_RENAMED) {
            status = status | StatusFlags::ADDED_LOCALLY | StatusFlags::COPIED_LOCALLY;
        }
        if status.is_empty() {
            // CURRENT is the empty git2 set
            status = StatusFlags::UP_TO_DATE;
        }

        Self::new(status, is_directory)
    }

    pub fn importance(&self) -> u8 {
        self.status.importance()
    }

    /// Short label of the dominant flag, for compact listings
    pub fn label(&self) -> &'static str {
        match self.status.dominant() {
            StatusFlags::CONFLICT => "C",
            StatusFlags::MERGE => "G",
            StatusFlags::DELETED_LOCALLY => "!",
            StatusFlags::REMOVED_LOCALLY => "D",
            StatusFlags::ADDED_LOCALLY => "A",
            StatusFlags::COPIED_LOCALLY => "A+",
            StatusFlags::MODIFIED_LOCALLY => "M",
            StatusFlags::NEW_LOCALLY => "??",
            StatusFlags::REMOVED_IN_REPOSITORY => "*D",
            StatusFlags::NEW_IN_REPOSITORY => "*A",
            StatusFlags::MODIFIED_IN_REPOSITORY => "*M",
            StatusFlags::UP_TO_DATE => "",
            StatusFlags::EXCLUDED => "I",
            StatusFlags::NOT_MANAGED => "-",
            _ => "?",
        }
    }

    /// Human-readable description of the dominant flag
    pub fn description(&self) -> &'static str {
        match self.status.dominant() {
            StatusFlags::CONFLICT => "conflict",
            StatusFlags::MERGE => "merged",
            StatusFlags::DELETED_LOCALLY => "missing",
            StatusFlags::REMOVED_LOCALLY => "removed",
            StatusFlags::ADDED_LOCALLY => "added",
            StatusFlags::COPIED_LOCALLY => "copied",
            StatusFlags::MODIFIED_LOCALLY => "modified",
            StatusFlags::NEW_LOCALLY => "untracked",
            StatusFlags::REMOVED_IN_REPOSITORY => "removed in repository",
            StatusFlags::NEW_IN_REPOSITORY => "new in repository",
            StatusFlags::MODIFIED_IN_REPOSITORY => "modified in repository",
            StatusFlags::UP_TO_DATE => "up to date",
            StatusFlags::EXCLUDED => "ignored",
            StatusFlags::NOT_MANAGED => "not managed",
            _ => "unknown",
        }
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())?;
        if self.is_directory {
            write!(f, " (directory)")?;
        }
        Ok(())
    }
}
