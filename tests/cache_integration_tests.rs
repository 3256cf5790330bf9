use git_status_cache::{BucketStore, GitStatusProvider, StatusCache, StatusFlags, StatusRecord};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

mod common;
use common::{fixtures::*, repository::*};

fn open_cache(store_root: &Path) -> StatusCache {
    StatusCache::new(BucketStore::new(store_root), Arc::new(GitStatusProvider::new()))
}

#[cfg(test)]
mod cache_integration_tests {
    use super::*;

    #[test]
    fn test_status_answers_from_git_and_cache() -> anyhow::Result<()> {
        let repo = create_mixed_repo()?;
        let cache = open_cache(repo.cache_dir.path());

        assert_eq!(
            cache.get_status(&repo.join("src/a.txt")),
            StatusRecord::file(StatusFlags::MODIFIED_LOCALLY)
        );
        assert!(cache.get_status(&repo.join("src/b.txt")).is_up_to_date());
        assert_eq!(
            cache.get_status(&repo.join("notes.txt")),
            StatusRecord::file(StatusFlags::NEW_LOCALLY)
        );
        assert_eq!(
            cache.get_status(&repo.join("debug.log")),
            StatusRecord::file(StatusFlags::EXCLUDED)
        );
        assert!(cache.get_status(&repo.join("src/missing.txt")).is_unknown());

        let record = cache.store().read(&repo.join("src"))?.expect("src is cached");
        assert_eq!(record.entries.len(), 1);
        Ok(())
    }

    #[test]
    fn test_cache_survives_restart() -> anyhow::Result<()> {
        let repo = create_mixed_repo()?;
        let a = repo.join("src/a.txt");
        {
            let cache = open_cache(repo.cache_dir.path());
            assert!(cache.get_status(&a).status.contains(StatusFlags::MODIFIED_LOCALLY));
        }

        Command::new("git")
            .args(["checkout", "--", "src/a.txt"])
            .current_dir(repo.path())
            .output()?;

        let cache = open_cache(repo.cache_dir.path());
        // Served from disk until refreshed
        assert!(cache.get_status(&a).status.contains(StatusFlags::MODIFIED_LOCALLY));
        assert!(cache.refresh(&a, Some(repo.path()), false).is_up_to_date());
        assert!(cache.all_modified_values().get(&a).is_none());
        Ok(())
    }

    #[test]
    fn test_new_ignore_rule_propagates_to_children() -> anyhow::Result<()> {
        let repo = create_mixed_repo()?;
        let build = repo.join("build");
        let out = repo.join("build/out.o");
        create_file(repo.path(), "build/out.o", "object\n")?;

        let cache = open_cache(repo.cache_dir.path());
        assert_eq!(cache.get_status(&out), StatusRecord::file(StatusFlags::NEW_LOCALLY));
        assert_eq!(
            cache.get_status(&build),
            StatusRecord::directory(StatusFlags::NEW_LOCALLY)
        );

        let changed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changed);
        cache.subscribe(move |event| sink.lock().unwrap().push(event.file.clone()));

        fs::write(repo.join(".gitignore"), "*.log\nbuild/\n")?;
        assert_eq!(
            cache.refresh(&build, None, false),
            StatusRecord::directory(StatusFlags::EXCLUDED)
        );
        assert_eq!(cache.get_status(&out), StatusRecord::file(StatusFlags::EXCLUDED));
        assert_eq!(changed.lock().unwrap().as_slice(), &[build, out]);
        Ok(())
    }

    #[test]
    fn test_batch_refresh() -> anyhow::Result<()> {
        let repo = create_mixed_repo()?;
        let cache = open_cache(repo.cache_dir.path());
        let a = repo.join("src/a.txt");
        let b = repo.join("src/b.txt");
        let c = repo.join("src/c.txt");
        cache.get_status(&a);

        create_file(repo.path(), "src/b.txt", "b changed\n")?;
        create_file(repo.path(), "src/c.txt", "c\n")?;
        let result = cache.refresh_files(&[a.clone(), b.clone(), c.clone()]);

        assert_eq!(result[&b], StatusRecord::file(StatusFlags::MODIFIED_LOCALLY));
        assert_eq!(result[&c], StatusRecord::file(StatusFlags::NEW_LOCALLY));
        let modified = cache.all_modified_values();
        assert!(modified.contains_key(&a));
        assert!(modified.contains_key(&b));
        assert!(modified.contains_key(&c));
        Ok(())
    }

    #[test]
    fn test_unmanaged_folder_keeps_nested_repository() -> anyhow::Result<()> {
        let outer = tempfile::TempDir::new()?;
        let outer_path = outer.path().canonicalize()?;
        let store = tempfile::TempDir::new()?;
        let provider = GitStatusProvider::new();
        if git_status_cache::StatusProvider::is_managed(&provider, &outer_path) {
            // The temp directory lives inside a checkout; nothing to test
            return Ok(());
        }

        fs::create_dir(outer_path.join("inner"))?;
        Command::new("git")
            .args(["init"])
            .current_dir(outer_path.join("inner"))
            .output()?;
        fs::write(outer_path.join("loose.txt"), "x")?;

        let cache = open_cache(store.path());
        let entries = cache.scan_folder(&outer_path);
        assert_eq!(
            entries.get("inner"),
            Some(&StatusRecord::directory(StatusFlags::UP_TO_DATE))
        );
        assert_eq!(
            cache.get_status(&outer_path.join("loose.txt")).status,
            StatusFlags::NOT_MANAGED
        );
        Ok(())
    }
}
