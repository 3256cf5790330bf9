use crate::commands::CacheContext;
use crate::core::{change_summary, print_success, Result, RescanScheduler, StatusProvider};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Rescan `dir` (default: the current directory), or every directory below it
/// with `recursive`.
pub fn execute_scan(cache_dir: Option<&Path>, dir: Option<&Path>, recursive: bool) -> Result<()> {
    let ctx = CacheContext::open(cache_dir)?;
    let target = match dir {
        Some(dir) => ctx.resolve(dir),
        None => ctx.cwd.clone(),
    };

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    let listener = ctx.cache.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let scanned = if recursive {
        let dirs = collect_directories(&target, ctx.cache.provider());
        let scheduler = RescanScheduler::start(Arc::clone(&ctx.cache))?;
        for dir in &dirs {
            scheduler.schedule(dir);
        }
        scheduler.shutdown();
        dirs.len()
    } else {
        ctx.cache.rescan_folder(&target);
        1
    };

    ctx.cache.unsubscribe(listener);
    print_success(&format!(
        "Scanned {scanned} director{}, {}",
        if scanned == 1 { "y" } else { "ies" },
        change_summary(changes.load(Ordering::SeqCst))
    ));
    Ok(())
}

/// `root` and every directory below it, without descending into git metadata
/// or ignored directories.
fn collect_directories(root: &Path, provider: &dyn StatusProvider) -> Vec<PathBuf> {
    let mut dirs = vec![root.to_path_buf()];
    let mut index = 0;
    while index < dirs.len() {
        let current = dirs[index].clone();
        index += 1;
        if current != root && provider.is_ignored(&current) {
            continue;
        }
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_name() != ".git")
            .filter(|entry| entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        children.sort();
        dirs.extend(children);
    }
    dirs
}
