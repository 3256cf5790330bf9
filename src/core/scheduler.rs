//! Background rescans on a single worker thread.
//!
//! Callers that notice a directory may be stale (a file watcher, a VCS hook)
//! hand it to [`RescanScheduler::schedule`] instead of blocking on a scan.
//! Requests for a directory that is still waiting in the queue are coalesced.

use crate::core::error::Result;
use crate::core::status_cache::StatusCache;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

pub struct RescanScheduler {
    sender: Option<Sender<PathBuf>>,
    pending: Arc<Mutex<HashSet<PathBuf>>>,
    worker: Option<JoinHandle<()>>,
}

impl RescanScheduler {
    /// Spawn the worker thread for `cache`.
    pub fn start(cache: Arc<StatusCache>) -> Result<Self> {
        let (sender, receiver) = channel::<PathBuf>();
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let worker_pending = Arc::clone(&pending);

        let worker = thread::Builder::new()
            .name("status-rescan".to_string())
            .spawn(move || {
                for dir in receiver {
                    // Drop the marker first so a request arriving mid-scan is queued again
                    worker_pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&dir);
                    let changed = cache.rescan_folder(&dir);
                    log::debug!("Background rescan of '{}': {changed} changes", dir.display());
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            pending,
            worker: Some(worker),
        })
    }

    /// Queue `dir` for a rescan. Returns `false` if it is already queued or
    /// the scheduler has shut down.
    pub fn schedule(&self, dir: &Path) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(dir.to_path_buf()) {
            return false;
        }
        if sender.send(dir.to_path_buf()).is_err() {
            pending.remove(dir);
            log::warn!("Rescan worker is gone; dropping '{}'", dir.display());
            return false;
        }
        true
    }

    /// Number of directories waiting for the worker.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Finish every queued rescan and stop the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the channel ends the worker loop once the queue is drained
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Rescan worker panicked");
            }
        }
    }
}

impl Drop for RescanScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
