//! Per-file status façade over the bucket store.
//!
//! [`StatusCache`] answers "what is the status of this file" from the durable
//! store, falls back to the provider for directories it has never seen, prunes
//! up-to-date noise before persisting and tells listeners about every change.
//!
//! # Freshness
//! A directory is *known* when the store holds its record, or when it was
//! scanned and found clean (clean directories have no record on disk and are
//! remembered in memory). For a known directory a missing entry means the file
//! is up to date, or excluded/unmanaged when the whole directory is.
//!
//! Whether a directory is excluded or unmanaged as a whole is not part of its
//! record. A record written by an earlier process is classified through the
//! provider once, the first time this process looks at it.
//!
//! # Locking
//! One mutex guards the read-modify-write of directory records and the
//! in-memory markers. Provider calls happen without it; listeners run after it
//! has been released.

use crate::core::aggregate::ModifiedFiles;
use crate::core::bucket_store::BucketStore;
use crate::core::error::Result;
use crate::core::events::{ListenerId, StatusChangeEvent, StatusListeners};
use crate::core::provider::{is_git_metadata, StatusProvider};
use crate::core::status::{StatusFlags, StatusRecord};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Entries = HashMap<String, StatusRecord>;

#[derive(Debug, Default)]
struct CacheState {
    /// Scanned directories whose record turned out empty.
    clean_dirs: HashSet<PathBuf>,
    /// How each directory seen by this process relates to its working tree.
    kinds: HashMap<PathBuf, DirectoryKind>,
}

impl CacheState {
    fn implied(&self, dir: &Path) -> Implied {
        let kind = self.kinds.get(dir).copied();
        Implied {
            unmanaged: kind == Some(DirectoryKind::Unmanaged),
            excluded: kind == Some(DirectoryKind::Ignored),
        }
    }

    /// Excluded and unmanaged directories are known without a record.
    fn known_without_record(&self, dir: &Path) -> bool {
        self.clean_dirs.contains(dir)
            || matches!(
                self.kinds.get(dir),
                Some(DirectoryKind::Ignored | DirectoryKind::Unmanaged)
            )
    }

    fn forget(&mut self, dir: &Path) {
        self.clean_dirs.remove(dir);
        self.kinds.remove(dir);
    }
}
/// What a missing entry stands for in a known directory.
#[derive(Debug, Clone, Copy, Default)]
struct Implied {
    unmanaged: bool,
    excluded: bool,
}

impl Implied {
    fn status_of(self, path: &Path) -> StatusRecord {
        let Ok(meta) = fs::metadata(path) else {
            return StatusRecord::UNKNOWN;
        };
        let status = if self.unmanaged {
            StatusFlags::NOT_MANAGED
        } else if self.excluded {
            StatusFlags::EXCLUDED
        } else {
            StatusFlags::UP_TO_DATE
        };
        StatusRecord::new(status, meta.is_dir())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectoryKind {
    Managed,
    Ignored,
    Unmanaged,
}

/// Memoized ignore lookups shared by the files of one batch refresh.
#[derive(Debug, Default)]
pub struct BatchContext {
    ignored: HashMap<PathBuf, bool>,
}

impl BatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ignored(&mut self, provider: &dyn StatusProvider, path: &Path) -> bool {
        let inherited = path
            .ancestors()
            .skip(1)
            .any(|ancestor| self.ignored.get(ancestor).copied().unwrap_or(false));
        if inherited {
            return true;
        }
        *self
            .ignored
            .entry(path.to_path_buf())
            .or_insert_with(|| provider.is_ignored(path))
    }
}

pub struct StatusCache {
    store: BucketStore,
    provider: Arc<dyn StatusProvider>,
    listeners: StatusListeners,
    state: Mutex<CacheState>,
}

impl StatusCache {
    pub fn new(store: BucketStore, provider: Arc<dyn StatusProvider>) -> Self {
        Self {
            store,
            provider,
            listeners: StatusListeners::new(),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn store(&self) -> &BucketStore {
        &self.store
    }

    pub fn provider(&self) -> &dyn StatusProvider {
        self.provider.as_ref()
    }

    /// Cached status of `file`, scanning its directory first if it was never seen.
    pub fn get_status(&self, file: &Path) -> StatusRecord {
        let Some((dir, name)) = split_path(file) else {
            return self.provider_status(file, None).unwrap_or(StatusRecord::UNKNOWN);
        };

        self.ensure_classified(&dir);
        if let Some(record) = self.cached_status(file, &dir, &name) {
            return record;
        }
        if let Err(e) = self.scan_and_store(&dir) {
            log::warn!("Cannot scan '{}': {e}", dir.display());
            return StatusRecord::UNKNOWN;
        }
        self.cached_status(file, &dir, &name)
            .unwrap_or(StatusRecord::UNKNOWN)
    }

    /// Recompute the status of `file` through the provider and store it.
    ///
    /// A directory that starts or stops being excluded or unmanaged drags its
    /// cached children along. Listeners hear about every changed path, and
    /// about `file` itself when `force_notify` is set.
    pub fn refresh(&self, file: &Path, repo_hint: Option<&Path>, force_notify: bool) -> StatusRecord {
        let mut events = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([file.to_path_buf()]);
        let mut result = None;

        while let Some(path) = queue.pop_front() {
            if !visited.insert(path.clone()) {
                continue;
            }
            let first = result.is_none();
            let record = self.refresh_one(&path, repo_hint, force_notify && first, &mut queue, &mut events);
            if first {
                result = Some(record);
            }
        }

        self.publish(&events);
        result.unwrap_or(StatusRecord::UNKNOWN)
    }

    /// Store an already computed status for `file` as part of a batch.
    ///
    /// A file reported new while the cache has it excluded keeps the
    /// exclusion; a new file nothing is known about yet is checked against
    /// the ignore rules.
    pub fn refresh_file_status(
        &self,
        file: &Path,
        known: StatusRecord,
        batch: &mut BatchContext,
        always_fire: bool,
    ) -> StatusRecord {
        let Some((dir, name)) = split_path(file) else {
            return known;
        };
        if !self.ensure_known(&dir) {
            // Storing one entry would pass the rest of the directory off as clean
            return known;
        }

        let mut record = known;
        if known.status == StatusFlags::NEW_LOCALLY {
            match self.cached_entry(&dir, &name) {
                Some(cached) if cached.status.contains(StatusFlags::EXCLUDED) => {
                    log::debug!("Keeping '{}' excluded despite new status", file.display());
                    return cached;
                }
                None if batch.is_ignored(self.provider.as_ref(), file) => {
                    record = known.with_status(StatusFlags::EXCLUDED);
                }
                _ => {}
            }
        }

        let outcome = self.apply(file, &dir, &name, record);
        if outcome.changed || always_fire {
            self.publish(&[outcome.event(file)]);
        }
        record
    }

    /// Refresh many files with one provider call.
    pub fn refresh_files(&self, files: &[PathBuf]) -> HashMap<PathBuf, StatusRecord> {
        let statuses = match self.provider.batch_status(files) {
            Ok(statuses) => statuses,
            Err(e) => {
                log::warn!("Batch status of {} files failed: {e}", files.len());
                return HashMap::new();
            }
        };

        let mut batch = BatchContext::new();
        statuses
            .into_iter()
            .map(|(file, known)| {
                let record = self.refresh_file_status(&file, known, &mut batch, false);
                (file, record)
            })
            .collect()
    }

    /// Scan `dir` through the provider and store the result.
    ///
    /// Returns the entries now cached for the directory; on provider failure
    /// whatever was cached before.
    pub fn scan_folder(&self, dir: &Path) -> HashMap<String, StatusRecord> {
        match self.scan_and_store(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot scan '{}': {e}", dir.display());
                self.cached_entries(dir).unwrap_or_default()
            }
        }
    }

    /// Scan `dir` regardless of what is cached and notify about every child
    /// whose status changed. Returns the number of changes.
    pub fn rescan_folder(&self, dir: &Path) -> usize {
        self.ensure_classified(dir);
        let (before, implied_before) = {
            let state = self.lock();
            (self.entries_locked(&state, dir), state.implied(dir))
        };

        let after = match self.scan_and_store(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot rescan '{}': {e}", dir.display());
                return 0;
            }
        };
        let implied_after = self.lock().implied(dir);

        let mut names: HashSet<&String> = after.keys().collect();
        if let Some(before) = &before {
            names.extend(before.keys());
        }

        let events: Vec<StatusChangeEvent> = names
            .into_iter()
            .filter_map(|name| {
                let file = dir.join(name);
                let old = before.as_ref().map(|entries| {
                    entries
                        .get(name)
                        .copied()
                        .unwrap_or_else(|| implied_before.status_of(&file))
                });
                let new = after
                    .get(name)
                    .copied()
                    .unwrap_or_else(|| implied_after.status_of(&file));
                match old {
                    Some(old) if old.equivalent(&new) => None,
                    _ => Some(StatusChangeEvent { file, old, new }),
                }
            })
            .collect();

        log::debug!("Rescan of '{}' changed {} entries", dir.display(), events.len());
        self.publish(&events);
        events.len()
    }

    /// Forget everything cached for `dir` so the next query scans it again.
    pub fn invalidate(&self, dir: &Path) {
        let mut state = self.lock();
        state.forget(dir);
        self.store.write(dir, None);
    }

    /// Drop every cached record.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        *state = CacheState::default();
        self.store.clear()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StatusChangeEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Every modified file in the store; shared until the next write.
    pub fn all_modified_values(&self) -> Arc<ModifiedFiles> {
        self.store.all_modified_values()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh_one(
        &self,
        file: &Path,
        repo_hint: Option<&Path>,
        force_notify: bool,
        queue: &mut VecDeque<PathBuf>,
        events: &mut Vec<StatusChangeEvent>,
    ) -> StatusRecord {
        let Some((dir, name)) = split_path(file) else {
            return self.provider_status(file, repo_hint).unwrap_or(StatusRecord::UNKNOWN);
        };
        let known = self.ensure_known(&dir);

        let fresh = match self.provider_status(file, repo_hint) {
            Ok(fresh) if !known => return fresh,
            Ok(fresh) => fresh,
            Err(e) => {
                log::warn!("Keeping cached status of '{}': {e}", file.display());
                return self
                    .cached_status(file, &dir, &name)
                    .unwrap_or(StatusRecord::UNKNOWN);
            }
        };

        let outcome = self.apply(file, &dir, &name, fresh);

        if outcome.changed && fresh.is_directory {
            let scope_before =
                outcome.old.map_or(StatusFlags::UNKNOWN, |old| old.status) & StatusFlags::SUBTREE_SCOPED;
            let scope_after = fresh.status & StatusFlags::SUBTREE_SCOPED;
            if scope_before != scope_after {
                let children = self.mark_subtree(file, fresh.status);
                log::debug!(
                    "'{}' changed scope, refreshing {} cached children",
                    file.display(),
                    children.len()
                );
                queue.extend(children);
            }
        }

        if outcome.changed || force_notify {
            events.push(outcome.event(file));
        }
        fresh
    }

    /// Merge `fresh` into the record of `dir` and persist it.
    fn apply(&self, file: &Path, dir: &Path, name: &str, fresh: StatusRecord) -> ApplyOutcome {
        let mut state = self.lock();
        let implied = state.implied(dir);
        let mut entries = self.entries_locked(&state, dir);
        let old = match &entries {
            Some(entries) => Some(
                entries
                    .get(name)
                    .copied()
                    .unwrap_or_else(|| implied.status_of(file)),
            ),
            None => None,
        };

        if old.is_some_and(|old| old.equivalent(&fresh)) {
            return ApplyOutcome {
                old,
                new: fresh,
                changed: false,
            };
        }

        let entries = entries.get_or_insert_with(Entries::new);
        if fresh.is_unknown() {
            entries.remove(name);
            // The path may have been a directory with a record of its own
            self.store.write(file, None);
        } else if !fresh.is_directory && fresh.status == StatusFlags::UP_TO_DATE {
            entries.remove(name);
        } else {
            entries.insert(name.to_string(), fresh);
        }
        self.persist(&mut state, dir, entries);

        ApplyOutcome {
            old,
            new: fresh,
            changed: true,
        }
    }

    /// Record whether `dir` as a whole is excluded or unmanaged; returns its cached children.
    fn mark_subtree(&self, dir: &Path, status: StatusFlags) -> Vec<PathBuf> {
        let mut state = self.lock();
        let kind = if status.contains(StatusFlags::NOT_MANAGED) {
            DirectoryKind::Unmanaged
        } else if status.contains(StatusFlags::EXCLUDED) {
            DirectoryKind::Ignored
        } else {
            DirectoryKind::Managed
        };
        state.kinds.insert(dir.to_path_buf(), kind);

        let mut children: Vec<PathBuf> = self
            .entries_locked(&state, dir)
            .unwrap_or_default()
            .into_keys()
            .map(|name| dir.join(name))
            .collect();
        children.sort();
        children
    }

    fn persist(&self, state: &mut CacheState, dir: &Path, entries: &Entries) {
        self.store.write(dir, Some(entries));
        if entries.values().any(StatusRecord::is_persistable) {
            state.clean_dirs.remove(dir);
        } else {
            state.clean_dirs.insert(dir.to_path_buf());
        }
    }

    /// Classify and scan `dir` outside the lock, then store the result.
    fn scan_and_store(&self, dir: &Path) -> Result<Entries> {
        let (kind, entries) = self.scan(dir)?;

        let mut state = self.lock();
        state.forget(dir);
        state.kinds.insert(dir.to_path_buf(), kind);
        self.persist(&mut state, dir, &entries);

        log::debug!(
            "Scanned '{}' ({kind:?}): {} entries",
            dir.display(),
            entries.len()
        );
        Ok(entries)
    }

    fn scan(&self, dir: &Path) -> Result<(DirectoryKind, Entries)> {
        if is_git_metadata(dir) {
            return Ok((DirectoryKind::Unmanaged, Entries::new()));
        }

        let kind = self.classify(dir);
        if kind == DirectoryKind::Unmanaged {
            // Only nested working trees are worth remembering here
            let mut entries = Entries::new();
            for (name, child, is_directory) in list_children(dir) {
                if !is_directory || !self.is_repository_root(&child) {
                    continue;
                }
                let status = if self.provider.is_ignored(&child) {
                    StatusFlags::EXCLUDED
                } else {
                    StatusFlags::UP_TO_DATE
                };
                entries.insert(name, StatusRecord::directory(status));
            }
            return Ok((DirectoryKind::Unmanaged, entries));
        }

        if kind == DirectoryKind::Ignored {
            let entries = list_children(dir)
                .into_iter()
                .map(|(name, _, is_directory)| {
                    (name, StatusRecord::new(StatusFlags::EXCLUDED, is_directory))
                })
                .collect();
            return Ok((DirectoryKind::Ignored, entries));
        }

        let entries = self
            .provider
            .directory_status(dir)?
            .into_iter()
            .filter(|(path, record)| record.status != StatusFlags::UP_TO_DATE && !is_git_metadata(path))
            .filter_map(|(path, record)| Some((file_name(&path)?, record)))
            .collect();
        Ok((DirectoryKind::Managed, entries))
    }

    fn classify(&self, dir: &Path) -> DirectoryKind {
        if is_git_metadata(dir) || !self.provider.is_managed(dir) {
            DirectoryKind::Unmanaged
        } else if self.provider.is_ignored(dir) {
            DirectoryKind::Ignored
        } else {
            DirectoryKind::Managed
        }
    }

    /// Classify a directory whose record predates this process.
    fn ensure_classified(&self, dir: &Path) {
        {
            let state = self.lock();
            if state.kinds.contains_key(dir) || self.entries_locked(&state, dir).is_none() {
                return;
            }
        }
        let kind = self.classify(dir);
        log::debug!("Classified cached directory '{}' as {kind:?}", dir.display());
        self.lock().kinds.entry(dir.to_path_buf()).or_insert(kind);
    }

    /// Make sure `dir` is known, scanning it if needed. `false` if the scan failed.
    fn ensure_known(&self, dir: &Path) -> bool {
        if self.is_known(dir) {
            self.ensure_classified(dir);
            return true;
        }
        match self.scan_and_store(dir) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Cannot scan '{}': {e}", dir.display());
                false
            }
        }
    }

    fn is_repository_root(&self, dir: &Path) -> bool {
        self.provider
            .repository_root(dir)
            .is_some_and(|root| same_location(&root, dir))
    }

    fn provider_status(&self, file: &Path, repo_hint: Option<&Path>) -> Result<StatusRecord> {
        if is_git_metadata(file) {
            return Ok(StatusRecord::new(StatusFlags::NOT_MANAGED, file.is_dir()));
        }
        self.provider.file_status(file, repo_hint)
    }

    fn is_known(&self, dir: &Path) -> bool {
        let state = self.lock();
        self.entries_locked(&state, dir).is_some()
    }

    fn cached_entries(&self, dir: &Path) -> Option<Entries> {
        let state = self.lock();
        self.entries_locked(&state, dir)
    }

    fn cached_entry(&self, dir: &Path, name: &str) -> Option<StatusRecord> {
        self.cached_entries(dir)?.get(name).copied()
    }

    /// Status of `file` if its directory is known, without calling the provider.
    fn cached_status(&self, file: &Path, dir: &Path, name: &str) -> Option<StatusRecord> {
        let state = self.lock();
        let entries = self.entries_locked(&state, dir)?;
        Some(
            entries
                .get(name)
                .copied()
                .unwrap_or_else(|| state.implied(dir).status_of(file)),
        )
    }

    /// Entries of a known directory; `None` if it was never scanned.
    fn entries_locked(&self, state: &CacheState, dir: &Path) -> Option<Entries> {
        match self.store.read(dir) {
            Ok(Some(record)) => return Some(record.entries),
            Ok(None) => {}
            Err(e) => log::warn!("Cannot read cached status of '{}': {e}", dir.display()),
        }
        state.known_without_record(dir).then(Entries::new)
    }

    fn publish(&self, events: &[StatusChangeEvent]) {
        for event in events {
            self.listeners.publish(event);
        }
    }
}

impl std::fmt::Debug for StatusCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCache")
            .field("store", &self.store)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

struct ApplyOutcome {
    old: Option<StatusRecord>,
    new: StatusRecord,
    changed: bool,
}

impl ApplyOutcome {
    fn event(&self, file: &Path) -> StatusChangeEvent {
        StatusChangeEvent {
            file: file.to_path_buf(),
            old: self.old,
            new: self.new,
        }
    }
}

fn split_path(file: &Path) -> Option<(PathBuf, String)> {
    let dir = file.parent()?;
    let name = file_name(file)?;
    Some((dir.to_path_buf(), name))
}

fn file_name(path: &Path) -> Option<String> {
    Some(path.file_name()?.to_string_lossy().into_owned())
}

/// `(name, path, is_directory)` of every child of `dir`, skipping git metadata.
fn list_children(dir: &Path) -> Vec<(String, PathBuf, bool)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_name() != ".git")
        .map(|entry| {
            let is_directory = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
            (
                entry.file_name().to_string_lossy().into_owned(),
                entry.path(),
                is_directory,
            )
        })
        .collect()
}

fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
