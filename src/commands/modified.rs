use crate::commands::{sort_by_importance, CacheContext};
use crate::core::{format_status_line, print_info, print_section_header, Result, StatusRecord};
use std::path::{Path, PathBuf};

/// List every modified file the cache knows about, without calling git.
pub fn execute_modified(cache_dir: Option<&Path>) -> Result<()> {
    let ctx = CacheContext::open(cache_dir)?;
    let snapshot = ctx.cache.all_modified_values();

    if snapshot.is_empty() {
        print_info("No modified files in the cache");
        return Ok(());
    }

    let mut entries: Vec<(PathBuf, StatusRecord)> = snapshot
        .iter()
        .map(|(path, record)| (path.clone(), *record))
        .collect();
    sort_by_importance(&mut entries);

    print_section_header("Modified files");
    for (path, record) in &entries {
        println!("{}", format_status_line(*record, &ctx.display_path(path)));
    }
    println!();
    Ok(())
}
