//! Background population reports
//!
//! Failures of background cache population never reach the caller that
//! triggered them. They are logged, kept in a short history, and offered
//! on a bounded channel. A full channel drops the report and counts it,
//! so a slow or absent consumer can never stall a population task.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::vfs::VfsError;

/// Maximum number of recent reports to keep
const MAX_REPORT_HISTORY: usize = 32;

/// Step of background population that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopulatePhase {
    /// Opening the source a second time
    Reopen,
    /// Creating the file in the cache store
    Create,
    /// Streaming bytes from source to cache
    Copy,
    /// Closing the reopened source handle
    CloseSource,
    /// Closing (publishing) the cache file
    CloseCache,
}

impl fmt::Display for PopulatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            PopulatePhase::Reopen => "reopen",
            PopulatePhase::Create => "create",
            PopulatePhase::Copy => "copy",
            PopulatePhase::CloseSource => "close-source",
            PopulatePhase::CloseCache => "close-cache",
        };
        f.write_str(phase)
    }
}

/// Failure of one phase of a background population task
#[derive(Debug, Clone, thiserror::Error)]
pub enum PopulateError {
    #[error("error opening file for second time: {path}: {source}")]
    Reopen { path: String, source: VfsError },

    #[error("error creating file in cache: {path}: {source}")]
    Create { path: String, source: VfsError },

    #[error("error copying src file data into cache: {path}: {source}")]
    Copy { path: String, source: VfsError },

    #[error("error closing source file: {path}: {source}")]
    CloseSource { path: String, source: VfsError },

    #[error("error closing cache file: {path}: {source}")]
    CloseCache { path: String, source: VfsError },
}

impl PopulateError {
    pub fn new(phase: PopulatePhase, path: &str, source: VfsError) -> Self {
        let path = path.to_string();
        match phase {
            PopulatePhase::Reopen => PopulateError::Reopen { path, source },
            PopulatePhase::Create => PopulateError::Create { path, source },
            PopulatePhase::Copy => PopulateError::Copy { path, source },
            PopulatePhase::CloseSource => PopulateError::CloseSource { path, source },
            PopulatePhase::CloseCache => PopulateError::CloseCache { path, source },
        }
    }

    pub fn phase(&self) -> PopulatePhase {
        match self {
            PopulateError::Reopen { .. } => PopulatePhase::Reopen,
            PopulateError::Create { .. } => PopulatePhase::Create,
            PopulateError::Copy { .. } => PopulatePhase::Copy,
            PopulateError::CloseSource { .. } => PopulatePhase::CloseSource,
            PopulateError::CloseCache { .. } => PopulatePhase::CloseCache,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PopulateError::Reopen { path, .. }
            | PopulateError::Create { path, .. }
            | PopulateError::Copy { path, .. }
            | PopulateError::CloseSource { path, .. }
            | PopulateError::CloseCache { path, .. } => path,
        }
    }

    /// The underlying filesystem error
    pub fn cause(&self) -> &VfsError {
        match self {
            PopulateError::Reopen { source, .. }
            | PopulateError::Create { source, .. }
            | PopulateError::Copy { source, .. }
            | PopulateError::CloseSource { source, .. }
            | PopulateError::CloseCache { source, .. } => source,
        }
    }
}

/// Sending side for population reports
#[derive(Debug, Clone)]
pub struct ReportSink {
    tx: mpsc::Sender<PopulateError>,
    dropped: Arc<AtomicU64>,
    history: Arc<RwLock<VecDeque<PopulateError>>>,
}

impl ReportSink {
    /// Create a sink with room for `capacity` unread reports
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PopulateError>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            history: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_REPORT_HISTORY))),
        };
        (sink, rx)
    }

    /// Report a failure without ever blocking
    pub fn report(&self, err: PopulateError) {
        warn!(
            path = %err.path(),
            phase = %err.phase(),
            error = %err.cause(),
            "Background cache population failed"
        );

        {
            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            if history.len() >= MAX_REPORT_HISTORY {
                history.pop_front();
            }
            history.push_back(err.clone());
        }

        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(path = %err.path(), dropped = dropped, "Report channel full, dropping report");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Reports that could not be delivered
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Most recent reports, oldest first
    pub fn recent(&self) -> Vec<PopulateError> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
