//! File metadata types
//!
//! Defines the metadata returned by `stat` and directory listings.

use std::fs::Metadata;
use std::time::SystemTime;

/// Metadata for a file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name (last component of the path)
    pub name: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    /// Last modification time
    pub modified: SystemTime,
    /// Whether this entry is a directory
    pub is_dir: bool,
}

impl FileInfo {
    /// Build a FileInfo from local filesystem metadata
    pub fn from_metadata(name: impl Into<String>, metadata: &Metadata) -> Self {
        Self {
            name: name.into(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mode: permission_bits(metadata),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: metadata.is_dir(),
        }
    }

    /// Metadata for an in-memory regular file
    pub fn file(name: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            size,
            mode: 0o644,
            modified,
            is_dir: false,
        }
    }

    /// Metadata for an in-memory directory
    pub fn directory(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            size: 0,
            mode: 0o755,
            modified,
            is_dir: true,
        }
    }
}

/// Get the base name (last component of path)
pub fn base_name(path: &str) -> &str {
    let name = path.trim_end_matches('/');
    name.rsplit('/').next().unwrap_or(name)
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}
