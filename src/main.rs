use clap::{Parser, Subcommand};
use git_status_cache::commands::*;
use git_status_cache::core::{
    error::{Result, StatusCacheError},
    print_error,
};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "git-status-cache")]
#[command(about = "Persistent cache of git status for every file in a working tree")]
#[command(version = "0.1.0")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Base directory of the cache (overrides the configuration)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cached status of files (default: the current directory's entries)
    Status {
        /// Also list up-to-date entries
        #[arg(short, long)]
        all: bool,
        /// Files or directories to query
        paths: Vec<PathBuf>,
    },
    /// Recompute status through git and update the cache
    Refresh {
        /// Report every refreshed path, even when its status did not change
        #[arg(short, long)]
        force: bool,
        /// Files to refresh (default: rescan the current directory)
        paths: Vec<PathBuf>,
    },
    /// Rescan a directory into the cache
    Scan {
        /// Scan every directory below as well
        #[arg(short, long)]
        recursive: bool,
        /// Directory to scan (default: the current directory)
        dir: Option<PathBuf>,
    },
    /// List every modified file in the cache
    Modified,
    /// Delete the cache of the current working tree
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logging based on --debug flag
    if cli.debug {
        env::set_var("RUST_LOG", "debug");
    } else {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let cache_dir = cli.cache_dir.as_deref();
    let outcome = match &cli.command {
        Commands::Status { all, paths } => execute_status(cache_dir, paths, *all),
        Commands::Refresh { force, paths } => execute_refresh(cache_dir, paths, *force),
        Commands::Scan { recursive, dir } => execute_scan(cache_dir, dir.as_deref(), *recursive),
        Commands::Modified => execute_modified(cache_dir),
        Commands::Clear => execute_clear(cache_dir),
    };

    if let Err(e) = outcome {
        if let StatusCacheError::NotInGitRepo = e {
            print_error("Not in a git repository");
        } else {
            print_error(&e.to_string());
        }
        std::process::exit(1);
    }

    Ok(())
}
