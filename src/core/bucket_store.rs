//! Durable, bucketed store of per-directory status records.
//!
//! Directories are hashed into a fixed set of shared bucket files (see
//! [`bucket_format`](crate::core::bucket_format)) instead of one file per
//! directory. Lookups scan one bucket sequentially; writes rewrite the whole
//! bucket into a temporary file and swap it in, so a committed bucket is never
//! observed half-written.
//!
//! # Failure handling
//! - **Contention**: opening an existing bucket is retried with linear backoff
//! - **Corruption**: a bucket that cannot be parsed is deleted and read as a miss
//! - **Failed rewrite**: the temp file is dropped and the old bucket stays as it was
//!
//! One mutex serializes every read, write and aggregate rebuild.

use crate::core::aggregate::{AggregateView, ModifiedFiles};
use crate::core::bucket_format::{
    self, bucket_file_name, bucket_id, decode_payload, encode_record, parse_bucket_file_name,
    read_bytes, read_header, skip_bytes, utf16_len, TEMP_SUFFIX,
};
use crate::core::error::{Result, StatusCacheError};
use crate::core::status::StatusRecord;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// How often and how patiently an existing bucket file is reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 7,
            backoff: Duration::from_millis(30),
        }
    }
}

/// Cached entries of one directory, keyed by file name relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub directory: String,
    pub entries: HashMap<String, StatusRecord>,
}

impl DirectoryRecord {
    pub fn get(&self, name: &str) -> Option<StatusRecord> {
        self.entries.get(name).copied()
    }
}

/// Key a directory is stored under.
///
/// Keys are stored as UTF-16, so a path that is not valid Unicode has no key;
/// such directories are never cached rather than lossily merged with another.
pub fn directory_key(dir: &Path) -> Option<String> {
    dir.to_str().map(str::to_owned)
}

#[derive(Debug, Default)]
struct StoreState {
    generation: u64,
    aggregate: AggregateView,
}

#[derive(Debug)]
pub struct BucketStore {
    root: PathBuf,
    retry: RetryPolicy,
    state: Mutex<StoreState>,
}

impl BucketStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_retry_policy(root, RetryPolicy::default())
    }

    pub fn with_retry_policy(root: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            root: root.into(),
            retry,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of successful writes so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Path of the bucket file holding `dir`, if it can be cached at all.
    pub fn bucket_path(&self, dir: &Path) -> Option<PathBuf> {
        directory_key(dir).map(|key| self.bucket_file(bucket_id(&key)))
    }

    /// Look up the cached record of `dir`.
    ///
    /// A bucket that turns out to be unreadable is deleted and the lookup
    /// reported as a miss. Only failing to open the bucket at all is an error.
    pub fn read(&self, dir: &Path) -> Result<Option<DirectoryRecord>> {
        let Some(key) = directory_key(dir) else {
            return Ok(None);
        };
        let _state = self.lock();

        let path = self.bucket_file(bucket_id(&key));
        let Some(file) = self.open_existing(&path)? else {
            return Ok(None);
        };

        match find_record(&mut BufReader::new(file), &key) {
            Ok(found) => Ok(found.map(|entries| DirectoryRecord {
                directory: key,
                entries,
            })),
            Err(e) => {
                let err = StatusCacheError::corrupt_bucket(&path, e.to_string());
                log::warn!("{err}; deleting it");
                self.discard(&path);
                Ok(None)
            }
        }
    }

    /// Replace the record of `dir`, or remove it when `entries` is `None` or
    /// holds nothing worth persisting.
    ///
    /// Always reports `true`: a failed rewrite is logged and the previous
    /// bucket left in place. Use [`try_write`](Self::try_write) to observe failures.
    pub fn write(&self, dir: &Path, entries: Option<&HashMap<String, StatusRecord>>) -> bool {
        if let Err(e) = self.try_write(dir, entries) {
            log::error!(
                "Failed to persist status of '{}', keeping previous bucket: {e}",
                dir.display()
            );
        }
        true
    }

    /// Same as [`write`](Self::write) but surfaces the failure.
    pub fn try_write(&self, dir: &Path, entries: Option<&HashMap<String, StatusRecord>>) -> Result<()> {
        let Some(key) = directory_key(dir) else {
            log::debug!("Not caching non-Unicode directory '{}'", dir.display());
            return Ok(());
        };
        let mut state = self.lock();

        let persisted: Vec<(&String, &StatusRecord)> = entries
            .into_iter()
            .flatten()
            .filter(|(_, record)| record.is_persistable())
            .collect();

        self.rewrite_bucket(&key, &persisted)?;
        state.generation += 1;
        log::debug!(
            "Stored {} entries for '{key}' (generation {})",
            persisted.len(),
            state.generation
        );
        Ok(())
    }

    /// Every valuable entry in the store, keyed by absolute file path.
    ///
    /// The same snapshot is returned until the next successful write.
    pub fn all_modified_values(&self) -> Arc<ModifiedFiles> {
        let mut state = self.lock();
        let generation = state.generation;
        state
            .aggregate
            .snapshot(generation, || self.collect_modified())
    }

    /// Delete every bucket file.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        for path in self.bucket_files()? {
            fs::remove_file(&path)?;
        }
        state.generation += 1;
        log::debug!("Cleared bucket store at '{}'", self.root.display());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bucket_file(&self, id: i32) -> PathBuf {
        self.root.join(bucket_file_name(id))
    }

    /// Open an existing bucket, retrying transient failures.
    fn open_existing(&self, path: &Path) -> Result<Option<File>> {
        open_with_retry(path, self.retry, || File::open(path), thread::sleep)
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Could not delete bucket file '{}': {e}", path.display());
        }
    }

    fn rewrite_bucket(&self, key: &str, persisted: &[(&String, &StatusRecord)]) -> Result<()> {
        let target = self.bucket_file(bucket_id(key));
        let mut temp_name = target.clone().into_os_string();
        temp_name.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp_name);

        fs::create_dir_all(&self.root)
            .map_err(|e| StatusCacheError::cache_directory_creation_failed(&self.root, e))?;

        let written = match self.write_temp(&temp, &target, key, persisted) {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(e);
            }
        };

        if written == 0 {
            remove_if_exists(&temp).map_err(|e| StatusCacheError::bucket_write_failed(&temp, e))?;
            remove_if_exists(&target).map_err(|e| StatusCacheError::bucket_write_failed(&target, e))?;
            return Ok(());
        }
        replace_file(&temp, &target).map_err(|e| {
            let _ = fs::remove_file(&temp);
            StatusCacheError::bucket_write_failed(&target, e)
        })
    }

    /// Write the new record followed by every other record of the old bucket.
    fn write_temp(
        &self,
        temp: &Path,
        target: &Path,
        key: &str,
        persisted: &[(&String, &StatusRecord)],
    ) -> Result<u64> {
        let file = File::create(temp).map_err(|e| StatusCacheError::bucket_write_failed(temp, e))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;

        if !persisted.is_empty() {
            let record = encode_record(key, persisted.iter().copied());
            writer
                .write_all(&record)
                .map_err(|e| StatusCacheError::bucket_write_failed(temp, e))?;
            written += record.len() as u64;
        }

        if let Some(existing) = self.open_existing(target)? {
            written += copy_other_records(&mut BufReader::new(existing), &mut writer, key, target, temp)?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| StatusCacheError::bucket_write_failed(temp, e.into_error()))?;
        file.sync_all()
            .map_err(|e| StatusCacheError::bucket_write_failed(temp, e))?;
        Ok(written)
    }

    fn bucket_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let is_bucket = name
                .to_str()
                .and_then(parse_bucket_file_name)
                .is_some();
            if is_bucket {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn collect_modified(&self) -> ModifiedFiles {
        let mut modified = ModifiedFiles::new();
        let buckets = match self.bucket_files() {
            Ok(buckets) => buckets,
            Err(e) => {
                log::warn!("Cannot list bucket files in '{}': {e}", self.root.display());
                return modified;
            }
        };

        for path in buckets {
            let file = match self.open_existing(&path) {
                Ok(Some(file)) => file,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Skipping bucket '{}': {e}", path.display());
                    continue;
                }
            };
            if let Err(e) = collect_bucket(&mut BufReader::new(file), &mut modified) {
                log::warn!("Skipping rest of bucket '{}': {e}", path.display());
            }
        }
        modified
    }
}

/// Scan a bucket for `key`, decoding only the matching payload.
fn find_record<R: Read>(reader: &mut R, key: &str) -> io::Result<Option<HashMap<String, StatusRecord>>> {
    let key_len = utf16_len(key) as u32;
    let mut key_bytes = Vec::with_capacity(key_len as usize * 2);
    bucket_format::encode_utf16(key, &mut key_bytes);

    while let Some(header) = read_header(reader)? {
        if header.path_len != key_len {
            skip_bytes(reader, header.path_bytes() + u64::from(header.payload_len))?;
            continue;
        }
        let path = read_bytes(reader, header.path_bytes())?;
        if path != key_bytes {
            skip_bytes(reader, u64::from(header.payload_len))?;
            continue;
        }
        let payload = read_bytes(reader, u64::from(header.payload_len))?;
        return decode_payload(&payload).map(Some);
    }
    Ok(None)
}

/// Copy every record except `key`'s verbatim. Returns the number of bytes copied.
///
/// A malformed tail in the old bucket ends the copy; the records before it are kept.
fn copy_other_records<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key: &str,
    source: &Path,
    dest: &Path,
) -> Result<u64> {
    let mut key_bytes = Vec::new();
    bucket_format::encode_utf16(key, &mut key_bytes);
    let mut copied = 0u64;

    loop {
        let record = read_raw_record(reader);
        let (header, path, payload) = match record {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) if matches!(e.kind(), io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData) => {
                log::warn!(
                    "Dropping corrupt tail of bucket '{}' after {copied} bytes: {e}",
                    source.display()
                );
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if path == key_bytes {
            continue;
        }

        write_raw_record(writer, &header, &path, &payload)
            .map_err(|e| StatusCacheError::bucket_write_failed(dest, e))?;
        copied += (bucket_format::RecordHeader::SIZE + path.len() + payload.len()) as u64;
    }
    Ok(copied)
}

fn write_raw_record<W: Write>(
    writer: &mut W,
    header: &bucket_format::RecordHeader,
    path: &[u8],
    payload: &[u8],
) -> io::Result<()> {
    writer.write_all(&header.to_bytes())?;
    writer.write_all(path)?;
    writer.write_all(payload)
}

type RawRecord = (bucket_format::RecordHeader, Vec<u8>, Vec<u8>);

fn read_raw_record<R: Read>(reader: &mut R) -> io::Result<Option<RawRecord>> {
    let Some(header) = read_header(reader)? else {
        return Ok(None);
    };
    let path = read_bytes(reader, header.path_bytes())?;
    let payload = read_bytes(reader, u64::from(header.payload_len))?;
    Ok(Some((header, path, payload)))
}

/// Decode every record of a bucket into `modified`, keeping valuable entries only.
fn collect_bucket<R: Read>(reader: &mut R, modified: &mut ModifiedFiles) -> io::Result<()> {
    while let Some((_, path, payload)) = read_raw_record(reader)? {
        let directory = PathBuf::from(bucket_format::decode_utf16(&path)?);
        for (name, record) in decode_payload(&payload)? {
            if record.is_valuable() {
                modified.insert(directory.join(name), record);
            }
        }
    }
    Ok(())
}

/// Call `open` until it succeeds, reports `NotFound` or the policy runs out.
///
/// Retry `n` waits `backoff * n` through `pause`.
fn open_with_retry<T>(
    path: &Path,
    policy: RetryPolicy,
    mut open: impl FnMut() -> io::Result<T>,
    mut pause: impl FnMut(Duration),
) -> Result<Option<T>> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match open() {
            Ok(opened) => return Ok(Some(opened)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if attempt >= attempts => {
                return Err(StatusCacheError::bucket_open_failed(path, attempt, e))
            }
            Err(e) => {
                log::debug!(
                    "Opening '{}' failed (attempt {attempt}/{attempts}): {e}",
                    path.display()
                );
                pause(policy.backoff * attempt);
            }
        }
    }
}

/// Move `temp` over `target`.
///
/// The rename replaces an existing target in one step. The target is deleted
/// first only on platforms where rename refuses to overwrite.
fn replace_file(temp: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(temp, target) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            remove_if_exists(target)?;
            fs::rename(temp, target)
        }
        result => result,
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::StatusFlags;
    use tempfile::TempDir;

    fn entries(items: &[(&str, StatusRecord)]) -> HashMap<String, StatusRecord> {
        items
            .iter()
            .map(|(name, record)| (name.to_string(), *record))
            .collect()
    }

    fn modified() -> StatusRecord {
        StatusRecord::file(StatusFlags::MODIFIED_LOCALLY)
    }

    /// Find a second directory whose key hashes into the same bucket as `dir`.
    fn bucket_sibling(dir: &str) -> String {
        let id = bucket_id(dir);
        (0..10_000)
            .map(|i| format!("/other/{i}"))
            .find(|candidate| bucket_id(candidate) == id)
            .expect("some key collides within 10k candidates")
    }

    #[test]
    fn test_read_missing_bucket_is_none() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        assert!(store.read(Path::new("/repo/src")).unwrap().is_none());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let dir = Path::new("/repo/src");
        let map = entries(&[
            ("a.txt", modified()),
            ("lib", StatusRecord::directory(StatusFlags::EXCLUDED)),
        ]);

        assert!(store.write(dir, Some(&map)));
        let record = store.read(dir).unwrap().expect("record stored");
        assert_eq!(record.directory, "/repo/src");
        assert_eq!(record.entries, map);
        assert_eq!(store.generation(), 1);
        assert!(store.bucket_path(dir).unwrap().exists());
    }

    #[test]
    fn test_up_to_date_files_are_pruned() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let dir = Path::new("/repo/src");
        let map = entries(&[
            ("a.txt", modified()),
            ("b.txt", StatusRecord::file(StatusFlags::UP_TO_DATE)),
            ("c.txt", StatusRecord::file(StatusFlags::NOT_MANAGED)),
        ]);

        store.write(dir, Some(&map));
        let record = store.read(dir).unwrap().unwrap();
        assert_eq!(record.entries, entries(&[("a.txt", modified())]));
    }

    #[test]
    fn test_empty_map_removes_record_and_bucket() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let dir = Path::new("/repo/src");

        store.write(dir, Some(&entries(&[("a.txt", modified())])));
        store.write(dir, Some(&entries(&[("a.txt", StatusRecord::file(StatusFlags::UP_TO_DATE))])));

        assert!(store.read(dir).unwrap().is_none());
        assert!(!store.bucket_path(dir).unwrap().exists());
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn test_directories_sharing_a_bucket_stay_isolated() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let first = PathBuf::from("/repo/src");
        let second = PathBuf::from(bucket_sibling("/repo/src"));
        assert_eq!(store.bucket_path(&first), store.bucket_path(&second));

        let m1 = entries(&[("a.txt", modified())]);
        let m2 = entries(&[("z.txt", StatusRecord::file(StatusFlags::CONFLICT))]);
        store.write(&first, Some(&m1));
        store.write(&second, Some(&m2));

        assert_eq!(store.read(&first).unwrap().unwrap().entries, m1);
        assert_eq!(store.read(&second).unwrap().unwrap().entries, m2);

        store.write(&first, None);
        assert!(store.read(&first).unwrap().is_none());
        assert_eq!(store.read(&second).unwrap().unwrap().entries, m2);
    }

    #[test]
    fn test_truncated_bucket_heals() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let dir = Path::new("/repo/src");
        store.write(dir, Some(&entries(&[("a.txt", modified()), ("b.txt", modified())])));

        let bucket = store.bucket_path(dir).unwrap();
        let bytes = fs::read(&bucket).unwrap();
        fs::write(&bucket, &bytes[..bytes.len() - 5]).unwrap();

        assert!(store.read(dir).unwrap().is_none());
        assert!(!bucket.exists());

        let fresh = entries(&[("c.txt", modified())]);
        store.write(dir, Some(&fresh));
        assert_eq!(store.read(dir).unwrap().unwrap().entries, fresh);
    }

    #[test]
    fn test_write_over_truncated_tail_keeps_readable_records() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let first = PathBuf::from("/repo/src");
        let second = PathBuf::from(bucket_sibling("/repo/src"));
        let m1 = entries(&[("a.txt", modified())]);
        store.write(&first, Some(&m1));
        store.write(&second, Some(&entries(&[("b.txt", modified())])));

        // Newest record sits first, so chopping the tail damages `first`
        let bucket = store.bucket_path(&first).unwrap();
        let bytes = fs::read(&bucket).unwrap();
        fs::write(&bucket, &bytes[..bytes.len() - 2]).unwrap();

        let m3 = entries(&[("c.txt", modified())]);
        store.write(&first, Some(&m3));
        assert_eq!(store.read(&first).unwrap().unwrap().entries, m3);
        assert!(store.read(&second).unwrap().is_some());
    }

    #[test]
    fn test_failed_rewrite_keeps_previous_bucket() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let dir = Path::new("/repo/src");
        let original = entries(&[("a.txt", modified())]);
        store.write(dir, Some(&original));
        let generation = store.generation();

        // A directory squatting on the temp file name makes the rewrite fail, like a full disk
        let mut squatter = store.bucket_path(dir).unwrap().into_os_string();
        squatter.push(TEMP_SUFFIX);
        fs::create_dir(&squatter).unwrap();

        let update = entries(&[("b.txt", modified())]);
        assert!(store.try_write(dir, Some(&update)).is_err());
        // The lenient entry point still reports success
        assert!(store.write(dir, Some(&update)));

        assert_eq!(store.read(dir).unwrap().unwrap().entries, original);
        assert_eq!(store.generation(), generation);
    }

    #[test]
    fn test_all_modified_values_tracks_generation() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        store.write(
            Path::new("/repo/src"),
            Some(&entries(&[
                ("a.txt", modified()),
                ("lib", StatusRecord::directory(StatusFlags::UP_TO_DATE)),
            ])),
        );

        let first = store.all_modified_values();
        let second = store.all_modified_values();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
        assert_eq!(first.get(Path::new("/repo/src/a.txt")), Some(&modified()));

        store.write(
            Path::new("/repo/docs"),
            Some(&entries(&[("readme.md", StatusRecord::file(StatusFlags::NEW_LOCALLY))])),
        );
        let third = store.all_modified_values();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_eq!(third.len(), 2);
        assert!(third.contains_key(Path::new("/repo/docs/readme.md")));
    }

    #[test]
    fn test_all_modified_values_skips_corrupt_bucket() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        store.write(Path::new("/repo/src"), Some(&entries(&[("a.txt", modified())])));
        fs::write(temp.path().join("999.bin"), [0, 0, 0, 9, 0]).unwrap();
        fs::write(temp.path().join("notes.txt"), "not a bucket").unwrap();

        let all = store.all_modified_values();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_clear_removes_buckets() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let dir = Path::new("/repo/src");
        store.write(dir, Some(&entries(&[("a.txt", modified())])));

        store.clear().unwrap();
        assert!(store.read(dir).unwrap().is_none());
        assert!(store.all_modified_values().is_empty());
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 7);
        assert_eq!(policy.backoff, Duration::from_millis(30));
    }

    fn sharing_violation() -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, "file is in use")
    }

    #[test]
    fn test_open_retries_transient_failures_with_linear_backoff() {
        let policy = RetryPolicy {
            attempts: 7,
            backoff: Duration::from_millis(30),
        };
        let mut calls = 0;
        let mut pauses = Vec::new();

        let opened = open_with_retry(
            Path::new("/cache/17.bin"),
            policy,
            || {
                calls += 1;
                if calls < 4 {
                    Err(sharing_violation())
                } else {
                    Ok("bucket")
                }
            },
            |pause| pauses.push(pause),
        )
        .unwrap();

        assert_eq!(opened, Some("bucket"));
        assert_eq!(calls, 4);
        assert_eq!(
            pauses,
            vec![
                Duration::from_millis(30),
                Duration::from_millis(60),
                Duration::from_millis(90)
            ]
        );
    }

    #[test]
    fn test_open_gives_up_after_policy_attempts() {
        let mut calls = 0;
        let mut pauses = 0;

        let err = open_with_retry::<()>(
            Path::new("/cache/17.bin"),
            RetryPolicy::default(),
            || {
                calls += 1;
                Err(sharing_violation())
            },
            |_| pauses += 1,
        )
        .unwrap_err();

        assert_eq!(calls, 7);
        assert_eq!(pauses, 6);
        assert!(matches!(
            err,
            StatusCacheError::BucketOpenFailed { attempts: 7, .. }
        ));
    }

    #[test]
    fn test_open_missing_bucket_is_not_retried() {
        let mut calls = 0;
        let opened = open_with_retry::<()>(
            Path::new("/cache/17.bin"),
            RetryPolicy::default(),
            || {
                calls += 1;
                Err(io::Error::from(io::ErrorKind::NotFound))
            },
            |_| panic!("a missing bucket must not be retried"),
        )
        .unwrap();

        assert_eq!(opened, None);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_failed_swap_keeps_committed_bucket() {
        let temp = TempDir::new().unwrap();
        let store = BucketStore::with_retry_policy(
            temp.path(),
            RetryPolicy {
                attempts: 1,
                backoff: Duration::ZERO,
            },
        );
        let dir = Path::new("/repo/src");
        let original = entries(&[("a.txt", modified())]);
        store.write(dir, Some(&original));
        let bucket = store.bucket_path(dir).unwrap();

        let missing = temp.path().join("never-written.bin.new");
        assert!(replace_file(&missing, &bucket).is_err());

        assert!(bucket.exists());
        assert_eq!(store.read(dir).unwrap().unwrap().entries, original);
    }

    #[test]
    fn test_swap_overwrites_existing_bucket() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("200.bin");
        let staged = temp.path().join("200.bin.new");
        fs::write(&target, b"old").unwrap();
        fs::write(&staged, b"new").unwrap();

        replace_file(&staged, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!staged.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_directories_are_not_cached() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let store = BucketStore::new(temp.path());
        let first = Path::new(OsStr::from_bytes(b"/repo/\xff"));
        let second = Path::new(OsStr::from_bytes(b"/repo/\xfe"));

        assert!(store.bucket_path(first).is_none());
        store.try_write(first, Some(&entries(&[("a.txt", modified())]))).unwrap();
        assert!(store.read(second).unwrap().is_none());
        assert!(store.read(first).unwrap().is_none());
        assert_eq!(store.generation(), 0);
        assert!(store.all_modified_values().is_empty());
    }
}
