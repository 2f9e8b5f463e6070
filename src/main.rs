//! fscache - read files through a local cache
//!
//! Wires a source directory and a cache directory together and streams
//! files through the caching layer.

use anyhow::{anyhow, Context as _, Result};
use std::env;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fscache::{CacheConfig, CachedFileSystem, Context, DirStore, FileSystem, LocalFs};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Stream files to stdout
    Get { paths: Vec<String> },
    /// List a directory
    Ls { path: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"fscache - Read files through a local read-through cache

USAGE:
    fscache get <path>...
    fscache ls [path]
    fscache help

COMMANDS:
    get     Stream files to stdout, caching them for the next read
    ls      List a directory (served from the cache when present)
    help    Show this help message

ENVIRONMENT:
    FSCACHE_CONFIG             JSON config file (optional)
    FSCACHE_SOURCE             Source directory (required unless set in config)
    FSCACHE_CACHE_DIR          Cache directory (default: platform cache dir)
    FSCACHE_REPORT_CAPACITY    Unread background error reports kept
    FSCACHE_POPULATE_TIMEOUT   Seconds allowed per background copy (0 = none)
    RUST_LOG                   Log filter (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "get" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: fscache get <path>..."));
            }
            Ok(Command::Get {
                paths: args[2..].to_vec(),
            })
        }
        "ls" => Ok(Command::Ls {
            path: args.get(2).cloned().unwrap_or_default(),
        }),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

/// Build the caching filesystem and start draining its reports
fn build(config: &CacheConfig) -> Result<(CachedFileSystem, tokio::task::JoinHandle<usize>)> {
    let source_dir = config
        .source_dir
        .clone()
        .ok_or_else(|| anyhow!("No source directory configured (set FSCACHE_SOURCE)"))?;

    let store = DirStore::new(config.cache_dir.clone());
    if config.cleanup_on_start {
        store.cleanup();
    }

    let (fs, mut reports) = CachedFileSystem::with_options(
        Arc::new(LocalFs::new(source_dir)),
        Arc::new(store),
        config.cache_options(),
    );
    info!(fs = %fs.name(), "Cache ready");

    // Reports are logged as they are raised; only count them here
    let drain = tokio::spawn(async move {
        let mut received = 0;
        while reports.recv().await.is_some() {
            received += 1;
        }
        received
    });

    Ok((fs, drain))
}

async fn get(fs: &CachedFileSystem, paths: &[String]) -> Result<()> {
    let ctx = Context::background();
    let mut stdout = tokio::io::stdout();

    for path in paths {
        let mut file = fs
            .open(&ctx, path)
            .await
            .with_context(|| format!("Failed to open {}", path))?;
        tokio::io::copy(&mut file, &mut stdout)
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        file.close().await?;
    }

    stdout.flush().await?;
    Ok(())
}

async fn ls(fs: &CachedFileSystem, path: &str) -> Result<()> {
    let ctx = Context::background();
    let mut dir = fs
        .open(&ctx, path)
        .await
        .with_context(|| format!("Failed to open {:?}", path))?;
    let entries = dir.readdir().await?;
    dir.close().await?;

    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        println!("{:o}  {:>12}  {}{}", entry.mode, entry.size, entry.name, suffix);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (stdout carries file data)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = CacheConfig::load()?;
    let (fs, drain) = build(&config)?;

    let result = match command {
        Command::Get { paths } => get(&fs, &paths).await,
        Command::Ls { path } => ls(&fs, &path).await,
        Command::Help => Ok(()),
    };

    // Let background copies finish before exiting
    fs.wait().await?;
    fs.log_metrics();
    drop(fs);
    match drain.await {
        Ok(0) => {}
        Ok(failed) => warn!(failed = failed, "Some files could not be cached"),
        Err(e) => error!(error = %e, "Report drain task failed"),
    }

    result
}
