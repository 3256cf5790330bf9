//! Status provider backed by `git2`.
//!
//! [`GitStatusProvider`] answers status queries for any path by discovering the
//! working tree that contains it. A `git2::Repository` is not `Sync`, so the
//! repository is reopened per call instead of being shared between threads.
//!
//! # Key Features
//! - **Directory scans**: one `git status` pass limited to the immediate children of a directory
//! - **Single files**: `status_file` with a fallback for paths git knows nothing about
//! - **Batches**: one pass with exact pathspecs for many files of the same working tree
//! - **Ignore rules**: `.gitignore` lookups for files that do not exist yet

use crate::core::error::{Result, StatusCacheError};
use crate::core::provider::{is_git_metadata, StatusProvider};
use crate::core::status::{StatusFlags, StatusRecord};
use git2::{ErrorCode, Repository, StatusOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Copy)]
pub struct GitStatusProvider;

impl GitStatusProvider {
    pub fn new() -> Self {
        Self
    }

    /// Canonical root of the working tree containing `path`.
    pub fn working_tree_root<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let repo = discover(path.as_ref()).map_err(|_| StatusCacheError::NotInGitRepo)?;
        let workdir = repo.workdir().ok_or(StatusCacheError::NotInGitRepo)?;
        Ok(workdir.canonicalize()?)
    }

    fn unmanaged(path: &Path) -> StatusRecord {
        StatusRecord::new(StatusFlags::NOT_MANAGED, path.is_dir())
    }

    fn untracked_status(repo: &Repository, file: &Path, relative: &Path) -> Result<StatusRecord> {
        if !file.exists() {
            return Ok(StatusRecord::UNKNOWN);
        }
        let status = if repo.is_path_ignored(relative)? {
            StatusFlags::EXCLUDED
        } else {
            StatusFlags::NEW_LOCALLY
        };
        Ok(StatusRecord::new(status, file.is_dir()))
    }
}

impl StatusProvider for GitStatusProvider {
    fn directory_status(&self, dir: &Path) -> Result<HashMap<PathBuf, StatusRecord>> {
        let repo = discover(dir)?;
        let relative = relative_path(&repo, dir)?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(true)
            .recurse_untracked_dirs(false)
            .recurse_ignored_dirs(false);
        let pathspec = git_path(&relative)?;
        if !pathspec.is_empty() {
            opts.pathspec(&pathspec);
        }

        let statuses = repo.statuses(Some(&mut opts))?;
        let mut children = HashMap::new();

        for entry in statuses.iter() {
            let raw = entry.path().ok_or(StatusCacheError::InvalidUtf8Path)?;
            let marked_directory = raw.ends_with('/');
            let entry_path = Path::new(raw.trim_end_matches('/'));

            // The directory itself is untracked or ignored as a whole
            if entry_path == relative.as_path() {
                for child in child_paths(dir) {
                    let is_directory = child.is_dir();
                    children.insert(child, StatusRecord::from_git2(entry.status(), is_directory));
                }
                continue;
            }

            // Only immediate children; deeper changes belong to their own directory
            if entry_path.parent() != Some(relative.as_path()) {
                continue;
            }
            let Some(name) = entry_path.file_name() else {
                continue;
            };

            let child = dir.join(name);
            let is_directory = marked_directory || child.is_dir();
            children.insert(child, StatusRecord::from_git2(entry.status(), is_directory));
        }

        log::debug!(
            "git status of '{}': {} changed children",
            dir.display(),
            children.len()
        );
        Ok(children)
    }

    fn file_status(&self, file: &Path, repo_hint: Option<&Path>) -> Result<StatusRecord> {
        if is_git_metadata(file) {
            return Ok(Self::unmanaged(file));
        }

        let repo = match repo_hint {
            Some(root) => Repository::open(root)?,
            None => match discover(file) {
                Ok(repo) => repo,
                Err(_) => return Ok(Self::unmanaged(file)),
            },
        };

        let relative = match relative_path(&repo, file) {
            Ok(relative) => relative,
            Err(StatusCacheError::OutsideWorkingTree { .. }) => return Ok(Self::unmanaged(file)),
            Err(e) => return Err(e),
        };
        if relative.as_os_str().is_empty() {
            return Ok(StatusRecord::directory(StatusFlags::UP_TO_DATE));
        }

        if file.is_dir() {
            // Directories have no status of their own; ask their parent's scan
            let Some(parent) = file.parent() else {
                return Ok(StatusRecord::directory(StatusFlags::UP_TO_DATE));
            };
            let siblings = self.directory_status(parent)?;
            return Ok(siblings
                .get(file)
                .copied()
                .unwrap_or(StatusRecord::directory(StatusFlags::UP_TO_DATE)));
        }

        match repo.status_file(&relative) {
            Ok(flags) => Ok(StatusRecord::from_git2(flags, false)),
            Err(e) if e.code() == ErrorCode::NotFound => Self::untracked_status(&repo, file, &relative),
            Err(e) => Err(e.into()),
        }
    }

    fn batch_status(&self, files: &[PathBuf]) -> Result<HashMap<PathBuf, StatusRecord>> {
        let mut result = HashMap::new();
        let Some(first) = files.first() else {
            return Ok(result);
        };
        let repo = match discover(first) {
            Ok(repo) => repo,
            Err(_) => {
                for file in files {
                    result.insert(file.clone(), self.file_status(file, None)?);
                }
                return Ok(result);
            }
        };

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(true)
            .include_unmodified(true)
            .recurse_untracked_dirs(false)
            .disable_pathspec_match(true);

        let mut wanted: HashMap<String, PathBuf> = HashMap::new();
        let mut elsewhere = Vec::new();
        for file in files {
            match relative_path(&repo, file) {
                Ok(relative) if !relative.as_os_str().is_empty() && !file.is_dir() => {
                    let spec = git_path(&relative)?;
                    opts.pathspec(&spec);
                    wanted.insert(spec, file.clone());
                }
                _ => elsewhere.push(file.clone()),
            }
        }

        if !wanted.is_empty() {
            let statuses = repo.statuses(Some(&mut opts))?;
            for entry in statuses.iter() {
                let Some(raw) = entry.path() else { continue };
                if let Some(file) = wanted.remove(raw.trim_end_matches('/')) {
                    result.insert(file, StatusRecord::from_git2(entry.status(), false));
                }
            }
            // Paths git did not list at all: not on disk and not in the index
            for (_, file) in wanted {
                let relative = relative_path(&repo, &file)?;
                let record = Self::untracked_status(&repo, &file, &relative)?;
                result.insert(file, record);
            }
        }

        for file in elsewhere {
            let record = self.file_status(&file, None)?;
            result.insert(file, record);
        }
        Ok(result)
    }

    fn is_managed(&self, path: &Path) -> bool {
        if is_git_metadata(path) {
            return false;
        }
        discover(path)
            .and_then(|repo| relative_path(&repo, path))
            .is_ok()
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let Ok(repo) = discover(path) else {
            return false;
        };
        match relative_path(&repo, path) {
            Ok(relative) if !relative.as_os_str().is_empty() => {
                repo.is_path_ignored(&relative).unwrap_or(false)
            }
            _ => false,
        }
    }

    fn repository_root(&self, path: &Path) -> Option<PathBuf> {
        let repo = discover(path).ok()?;
        let root = repo.workdir()?.to_path_buf();
        relative_path(&repo, path).ok()?;
        Some(root.canonicalize().unwrap_or(root))
    }
}

/// Open the repository containing `path`, starting from its nearest existing directory.
fn discover(path: &Path) -> Result<Repository> {
    let start = path
        .ancestors()
        .find(|ancestor| ancestor.is_dir())
        .unwrap_or(path);
    Ok(Repository::discover(start)?)
}

/// `path` relative to the repository's working directory.
///
/// Tries the path as given first, then canonical forms of both sides, so
/// symlinked temp directories and deleted files resolve alike.
fn relative_path(repo: &Repository, path: &Path) -> Result<PathBuf> {
    let workdir = repo.workdir().ok_or(StatusCacheError::NotInGitRepo)?;
    if let Ok(relative) = path.strip_prefix(workdir) {
        return Ok(relative.to_path_buf());
    }

    let canonical_workdir = workdir.canonicalize()?;
    let canonical_path = canonicalize_existing_prefix(path)?;
    canonical_path
        .strip_prefix(&canonical_workdir)
        .map(Path::to_path_buf)
        .map_err(|_| StatusCacheError::outside_working_tree(path))
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf> {
    for ancestor in path.ancestors() {
        if let Ok(canonical) = ancestor.canonicalize() {
            let rest = path.strip_prefix(ancestor).unwrap_or(Path::new(""));
            return Ok(if rest.as_os_str().is_empty() {
                canonical
            } else {
                canonical.join(rest)
            });
        }
    }
    Ok(path.to_path_buf())
}

fn child_paths(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_name() != ".git")
        .map(|entry| entry.path())
        .collect()
}

/// Relative path spelled the way git expects it.
fn git_path(relative: &Path) -> Result<String> {
    let path = relative.to_str().ok_or(StatusCacheError::InvalidUtf8Path)?;
    Ok(path.replace('\\', "/"))
}
