//! Common assertion helpers for test output validation

#![allow(dead_code)]

use predicates::prelude::*;

/// Creates a predicate that checks for git repository error messages
pub fn not_in_git_repo() -> impl Predicate<str> {
    predicates::str::contains("Not in a git repository")
}

/// Creates a predicate that checks for a status description, e.g. "(modified)"
pub fn has_status(description: &str) -> impl Predicate<str> {
    predicates::str::contains(format!("({})", description))
}

/// Creates a predicate that checks for the change counter of refresh and scan
pub fn has_changes(count: usize) -> impl Predicate<str> {
    predicates::str::contains(format!("{} status change(s)", count))
}
