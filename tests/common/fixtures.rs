//! Predefined repository scenarios shared by the integration tests.

#![allow(dead_code)]

use super::repository::*;
use git_status_cache::core::error::Result;

/// Scenario: committed `src/a.txt`, `src/b.txt` and `.gitignore`, then
/// `src/a.txt` modified, `notes.txt` untracked and `debug.log` ignored.
pub fn create_mixed_repo() -> Result<TestRepo> {
    let repo = setup_test_repo()?;

    create_file(&repo.path, "src/a.txt", "a\n")?;
    create_file(&repo.path, "src/b.txt", "b\n")?;
    create_file(&repo.path, ".gitignore", "*.log\n")?;
    git_add(&repo.path, ".")?;
    git_commit(&repo.path, "Initial commit")?;

    create_file(&repo.path, "src/a.txt", "a changed\n")?;
    create_file(&repo.path, "notes.txt", "todo\n")?;
    create_file(&repo.path, "debug.log", "noise\n")?;

    Ok(repo)
}
