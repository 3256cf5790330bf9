//! Change notification for cached statuses.
//!
//! Events are delivered synchronously on whichever thread performed the change.
//! Listeners must not assume a UI thread.

use crate::core::status::StatusRecord;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// One file's status changed (or a refresh was forced).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChangeEvent {
    pub file: PathBuf,
    pub old: Option<StatusRecord>,
    pub new: StatusRecord,
}

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&StatusChangeEvent) + Send + Sync>;

/// Registry of change listeners.
#[derive(Default)]
pub struct StatusListeners {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl StatusListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StatusChangeEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns `true` if the listener was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener on the calling thread.
    pub fn publish(&self, event: &StatusChangeEvent) {
        // Listeners run outside the registry lock so they may (un)subscribe
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        log::debug!(
            "Status of '{}' changed: {:?} -> {} ({} listeners)",
            event.file.display(),
            event.old.map(|old| old.description()),
            event.new,
            listeners.len()
        );
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for StatusListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusListeners")
            .field("listener_count", &self.len())
            .finish()
    }
}
