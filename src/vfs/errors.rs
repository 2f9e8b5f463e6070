//! Filesystem Error Types
//!
//! Structured error handling for virtual filesystem operations.
//! Errors are cheap to clone so that a source failure can be memoized
//! and handed back to later callers.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Virtual filesystem error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum VfsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid path ('{}' is outside '{}'): {path}", .parent.display(), .root.display())]
    PathEscape {
        path: String,
        parent: PathBuf,
        root: PathBuf,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    Timeout,

    #[error("Cached error for {path}: {source}")]
    CachedFailure {
        path: String,
        #[source]
        source: Box<VfsError>,
    },

    #[error("Source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl VfsError {
    /// Map an I/O error for `path` onto the closest variant
    pub fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied(path.to_string()),
            _ => VfsError::Io(Arc::new(err)),
        }
    }

    /// Map error to an appropriate libc errno
    pub fn to_errno(&self) -> i32 {
        match self {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::PermissionDenied(_) => libc::EACCES,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::PathEscape { .. } => libc::EACCES,
            VfsError::Cancelled => libc::ECANCELED,
            VfsError::Timeout => libc::ETIMEDOUT,
            VfsError::CachedFailure { source, .. } => source.to_errno(),
            VfsError::Source(_) => libc::EIO,
            VfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Whether this error came from the caller's context rather than the filesystem
    ///
    /// Such errors say nothing about the path and must not be memoized.
    pub fn is_context_error(&self) -> bool {
        matches!(self, VfsError::Cancelled | VfsError::Timeout)
    }

    /// Whether this error was replayed from the failure cache
    pub fn is_cached(&self) -> bool {
        matches!(self, VfsError::CachedFailure { .. })
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        VfsError::Io(Arc::new(err))
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            VfsError::PermissionDenied(_) | VfsError::PathEscape { .. } => {
                io::Error::new(io::ErrorKind::PermissionDenied, err)
            }
            VfsError::Timeout => io::Error::new(io::ErrorKind::TimedOut, err),
            VfsError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
