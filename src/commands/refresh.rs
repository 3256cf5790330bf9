use crate::commands::CacheContext;
use crate::core::{change_summary, print_success, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Recompute the status of `paths` (or rescan the current directory) and
/// report how many cached statuses changed.
///
/// `force` notifies about every refreshed path, changed or not.
pub fn execute_refresh(cache_dir: Option<&Path>, paths: &[PathBuf], force: bool) -> Result<()> {
    let ctx = CacheContext::open(cache_dir)?;

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    let listener = ctx.cache.subscribe(move |event| {
        log::debug!("{}: {}", event.file.display(), event.new);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let resolved: Vec<PathBuf> = paths.iter().map(|path| ctx.resolve(path)).collect();
    let refreshed = match resolved.as_slice() {
        [] => {
            ctx.cache.rescan_folder(&ctx.cwd);
            1
        }
        [single] => {
            ctx.cache.refresh(single, Some(&ctx.worktree), force);
            1
        }
        many if force => {
            for path in many {
                ctx.cache.refresh(path, Some(&ctx.worktree), true);
            }
            many.len()
        }
        many => ctx.cache.refresh_files(many).len(),
    };

    ctx.cache.unsubscribe(listener);
    print_success(&format!(
        "Refreshed {refreshed} path(s), {}",
        change_summary(changes.load(Ordering::SeqCst))
    ));
    Ok(())
}
