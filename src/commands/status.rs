use crate::commands::{sort_by_importance, CacheContext};
use crate::core::{format_status_line, print_info, print_section_header, Result, StatusRecord};
use std::fs;
use std::path::{Path, PathBuf};

/// Print the cached status of `paths`, or of the current directory's children.
///
/// Without explicit paths only entries worth reporting are shown unless `all` is set.
pub fn execute_status(cache_dir: Option<&Path>, paths: &[PathBuf], all: bool) -> Result<()> {
    let ctx = CacheContext::open(cache_dir)?;
    let explicit = !paths.is_empty();

    let targets: Vec<PathBuf> = if explicit {
        paths.iter().map(|path| ctx.resolve(path)).collect()
    } else {
        list_directory(&ctx.cwd)?
    };

    let mut entries: Vec<(PathBuf, StatusRecord)> = targets
        .into_iter()
        .map(|path| {
            let record = ctx.cache.get_status(&path);
            (path, record)
        })
        .filter(|(_, record)| explicit || all || record.is_valuable())
        .collect();

    if entries.is_empty() {
        print_info("Nothing to report, working directory clean");
        return Ok(());
    }

    sort_by_importance(&mut entries);
    print_section_header("Status");
    for (path, record) in &entries {
        println!("{}", format_status_line(*record, &ctx.display_path(path)));
    }
    println!();
    Ok(())
}

fn list_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}
