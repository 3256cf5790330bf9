use crate::commands::CacheContext;
use crate::core::{print_detail, print_success, Result};
use std::path::Path;

/// Delete every cached record of the current working tree.
pub fn execute_clear(cache_dir: Option<&Path>) -> Result<()> {
    let ctx = CacheContext::open(cache_dir)?;
    ctx.cache.clear()?;
    print_success(&format!("Cleared status cache for {}", ctx.worktree.display()));
    print_detail("Cache", &ctx.cache.store().root().display().to_string());
    Ok(())
}
