//! Generation-stamped snapshot of every modified file in the store.
//!
//! The snapshot is advisory: it is rebuilt lazily by a full scan whenever the
//! store's generation moved, and handed out as a shared read-only map otherwise.

use crate::core::status::StatusRecord;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Absolute file path to status, for every valuable entry in the store.
pub type ModifiedFiles = HashMap<PathBuf, StatusRecord>;

#[derive(Debug, Default)]
pub struct AggregateView {
    built_at: Option<u64>,
    snapshot: Arc<ModifiedFiles>,
}

impl AggregateView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cached snapshot was built from `generation`.
    pub fn is_current(&self, generation: u64) -> bool {
        self.built_at == Some(generation)
    }

    /// Return the snapshot for `generation`, rebuilding it first if it is stale.
    pub fn snapshot<F>(&mut self, generation: u64, rebuild: F) -> Arc<ModifiedFiles>
    where
        F: FnOnce() -> ModifiedFiles,
    {
        if !self.is_current(generation) {
            let files = rebuild();
            log::debug!(
                "Rebuilt modified-files snapshot at generation {generation}: {} entries",
                files.len()
            );
            self.snapshot = Arc::new(files);
            self.built_at = Some(generation);
        }
        Arc::clone(&self.snapshot)
    }

    pub fn invalidate(&mut self) {
        self.built_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::StatusFlags;
    use std::cell::Cell;

    fn one_file() -> ModifiedFiles {
        let mut files = ModifiedFiles::new();
        files.insert(
            PathBuf::from("/repo/a.txt"),
            StatusRecord::file(StatusFlags::MODIFIED_LOCALLY),
        );
        files
    }

    #[test]
    fn test_snapshot_reused_while_generation_unchanged() {
        let mut view = AggregateView::new();
        let rebuilds = Cell::new(0);

        let first = view.snapshot(3, || {
            rebuilds.set(rebuilds.get() + 1);
            one_file()
        });
        let second = view.snapshot(3, || {
            rebuilds.set(rebuilds.get() + 1);
            ModifiedFiles::new()
        });

        assert_eq!(rebuilds.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_snapshot_rebuilt_after_generation_moves() {
        let mut view = AggregateView::new();
        let first = view.snapshot(0, one_file);
        let second = view.snapshot(1, ModifiedFiles::new);

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_empty());
        assert!(view.is_current(1));
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let mut view = AggregateView::new();
        view.snapshot(5, one_file);
        view.invalidate();
        assert!(!view.is_current(5));
        assert!(view.snapshot(5, ModifiedFiles::new).is_empty());
    }
}
