//! Caching Filesystem
//!
//! Serves reads from a cache store, falling back to the source on a miss.
//! A miss that the source can serve is returned to the caller right away
//! while a background task copies the file into the cache store. Source
//! failures are remembered per path and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::failures::FailureCache;
use super::pending::{PendingTasks, TaskGuard};
use super::reports::{PopulateError, PopulatePhase, ReportSink};
use crate::vfs::path::clean_rooted;
use crate::vfs::{Context, File, FileSystem, RwFileSystem, VfsError};

/// Default number of unread population reports held by the channel
pub const DEFAULT_REPORT_CAPACITY: usize = 64;

/// Tuning for a `CachedFileSystem`
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Room for unread reports before new ones are dropped
    pub report_capacity: usize,
    /// Upper bound on a single background population task
    pub populate_timeout: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            report_capacity: DEFAULT_REPORT_CAPACITY,
            populate_timeout: None,
        }
    }
}

/// Read-only filesystem that caches every file read from `src` in `cache`
///
/// Entries are trusted forever once cached. Directories are always opened
/// on the source, since the cache only holds the files read so far. There
/// is no per-path de-duplication: racing opens of the same uncached path
/// each populate it.
pub struct CachedFileSystem {
    src: Arc<dyn FileSystem>,
    cache: Arc<dyn RwFileSystem>,
    failures: FailureCache,
    pending: PendingTasks,
    reports: ReportSink,
    populate_timeout: Option<Duration>,
    name: String,
}

impl CachedFileSystem {
    /// Cache `src` in `cache` with default options
    ///
    /// The returned receiver carries failures of background population.
    pub fn new(
        src: Arc<dyn FileSystem>,
        cache: Arc<dyn RwFileSystem>,
    ) -> (Self, mpsc::Receiver<PopulateError>) {
        Self::with_options(src, cache, CacheOptions::default())
    }

    /// Cache `src` in `cache`
    pub fn with_options(
        src: Arc<dyn FileSystem>,
        cache: Arc<dyn RwFileSystem>,
        options: CacheOptions,
    ) -> (Self, mpsc::Receiver<PopulateError>) {
        let (reports, rx) = ReportSink::new(options.report_capacity);
        let name = format!("cached({} -> {})", src.name(), cache.name());

        let fs = Self {
            src,
            cache,
            failures: FailureCache::new(),
            pending: PendingTasks::new(),
            reports,
            populate_timeout: options.populate_timeout,
            name,
        };
        (fs, rx)
    }

    /// Wait for every background population registered so far
    ///
    /// Never fails; population errors go to the report channel only.
    pub async fn wait(&self) -> Result<(), VfsError> {
        self.pending.wait().await;
        Ok(())
    }

    /// Number of background populations still running
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Reports dropped because the channel was full or closed
    pub fn dropped_reports(&self) -> u64 {
        self.reports.dropped()
    }

    /// Most recent population failures, oldest first
    pub fn recent_reports(&self) -> Vec<PopulateError> {
        self.reports.recent()
    }

    /// Failure cache statistics as (hits, misses, entries)
    pub fn failure_stats(&self) -> (u64, u64, usize) {
        self.failures.stats()
    }

    /// Log failure cache and population metrics
    pub fn log_metrics(&self) {
        self.failures.log_metrics();
        debug!(
            pending = self.pending(),
            dropped_reports = self.dropped_reports(),
            "Population metrics"
        );
    }

    /// Start copying `path` from the source into the cache store
    fn spawn_populate(&self, path: &str) {
        // Registered here, before the task exists, so wait() cannot miss it
        let guard = self.pending.register();

        let ctx = match self.populate_timeout {
            Some(timeout) => Context::background().with_timeout(timeout),
            None => Context::background(),
        };
        let task = Populate {
            src: Arc::clone(&self.src),
            cache: Arc::clone(&self.cache),
            reports: self.reports.clone(),
            path: path.to_string(),
        };

        tokio::spawn(task.run(ctx, guard));
    }
}

#[async_trait]
impl FileSystem for CachedFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, ctx: &Context, path: &str) -> Result<Box<dyn File>, VfsError> {
        let key = clean_rooted(path);

        if let Some(err) = self.failures.get(&key) {
            debug!(path = %path, "Serving memoized source failure");
            return Err(VfsError::CachedFailure {
                path: path.to_string(),
                source: Box::new(err),
            });
        }

        match self.cache.open(ctx, path).await {
            Ok(file) => {
                // A cached directory holds only what has been read so far
                let is_dir = matches!(file.stat().await, Ok(info) if info.is_dir);
                if !is_dir {
                    debug!(path = %path, "Cache HIT");
                    return Ok(file);
                }
                trace!(path = %path, "Cached directory, listing from source");
                file.close().await?;
            }
            Err(e) if e.is_context_error() => return Err(e),
            Err(e) => {
                debug!(path = %path, error = %e, "Cache MISS");
            }
        }

        let file = match self.src.open(ctx, path).await {
            Ok(file) => file,
            Err(e) => {
                if !e.is_context_error() {
                    self.failures.record(&key, e.clone());
                }
                return Err(e);
            }
        };

        self.spawn_populate(path);
        Ok(file)
    }
}

/// One background copy of a path from source to cache store
struct Populate {
    src: Arc<dyn FileSystem>,
    cache: Arc<dyn RwFileSystem>,
    reports: ReportSink,
    path: String,
}

impl Populate {
    async fn run(self, ctx: Context, _guard: TaskGuard) {
        trace!(path = %self.path, "Populating cache");

        // The caller's handle is theirs; copy from a fresh one
        let mut source = match self.src.open(&ctx, &self.path).await {
            Ok(file) => file,
            Err(e) => return self.fail(PopulatePhase::Reopen, e),
        };

        if matches!(source.stat().await, Ok(info) if info.is_dir) {
            trace!(path = %self.path, "Skipping directory");
            return self.close_source(source).await;
        }

        let mut dest = match self.cache.create(&ctx, &self.path).await {
            Ok(file) => file,
            Err(e) => {
                self.fail(PopulatePhase::Create, e);
                return self.close_source(source).await;
            }
        };

        let copied = ctx
            .run(async {
                tokio::io::copy(&mut source, &mut dest)
                    .await
                    .map_err(|e| VfsError::from_io(&self.path, e))
            })
            .await;

        self.close_source(source).await;

        match copied {
            Ok(bytes) => match dest.close().await {
                Ok(()) => debug!(path = %self.path, bytes = bytes, "Populated cache"),
                Err(e) => self.fail(PopulatePhase::CloseCache, e),
            },
            Err(e) => {
                self.fail(PopulatePhase::Copy, e);
                // A partial copy must never become a trusted cache entry
                if let Err(e) = dest.abort().await {
                    self.fail(PopulatePhase::CloseCache, e);
                }
            }
        }
    }

    async fn close_source(&self, source: Box<dyn File>) {
        if let Err(e) = source.close().await {
            self.fail(PopulatePhase::CloseSource, e);
        }
    }

    fn fail(&self, phase: PopulatePhase, err: VfsError) {
        self.reports.report(PopulateError::new(phase, &self.path, err));
    }
}
