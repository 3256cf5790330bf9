use crate::core::error::{Result, StatusCacheError};
use std::path::PathBuf;

const APP_DIR: &str = "git-status-cache";

/// Per-user configuration directory of the tool.
pub fn config_directory() -> Result<PathBuf> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => xdg_or_home("XDG_CONFIG_HOME", ".config")?,
        "macos" => home()?.join("Library/Application Support"),
        _ => dirs::config_dir().ok_or(StatusCacheError::CacheDirectoryNotFound)?,
    };
    Ok(base.join(APP_DIR))
}

/// Per-user cache directory under which every working tree gets its own store.
pub fn cache_directory() -> Result<PathBuf> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => xdg_or_home("XDG_CACHE_HOME", ".cache")?,
        "macos" => home()?.join("Library/Caches"),
        _ => dirs::cache_dir().ok_or(StatusCacheError::CacheDirectoryNotFound)?,
    };
    Ok(base.join(APP_DIR))
}

fn xdg_or_home(variable: &str, fallback: &str) -> Result<PathBuf> {
    match std::env::var_os(variable) {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => Ok(home()?.join(fallback)),
    }
}

fn home() -> Result<PathBuf> {
    dirs::home_dir().ok_or(StatusCacheError::CacheDirectoryNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directories_are_namespaced() {
        if let Ok(dir) = cache_directory() {
            assert!(dir.ends_with(APP_DIR));
        }
        if let Ok(dir) = config_directory() {
            assert!(dir.ends_with(APP_DIR));
        }
    }
}
