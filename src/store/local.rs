//! Local directory filesystem
//!
//! Read-only access to files under a root directory. Paths are cleaned as
//! if rooted before being joined to the root, so `..` can never climb out.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tracing::trace;

use super::TEMP_SUFFIX;
use crate::vfs::path::clean_rooted;
use crate::vfs::types::base_name;
use crate::vfs::{Context, File, FileInfo, FileSystem, VfsError};

/// Read-only filesystem rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    name: String,
    hide_temp_files: bool,
}

impl LocalFs {
    /// Create a filesystem serving files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("local ({})", root.display());
        Self {
            root,
            name,
            hide_temp_files: false,
        }
    }

    /// Leave in-flight cache writes out of directory listings
    pub fn hiding_temp_files(mut self) -> Self {
        self.hide_temp_files = true;
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for `path`, confined to the root
    pub fn local_path(&self, path: &str) -> PathBuf {
        let key = clean_rooted(path);
        if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(key)
        }
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, ctx: &Context, path: &str) -> Result<Box<dyn File>, VfsError> {
        let local_path = self.local_path(path);
        trace!(fs = %self.name, path = %path, local = %local_path.display(), "open");

        let file = ctx
            .run(async {
                tokio::fs::File::open(&local_path)
                    .await
                    .map_err(|e| VfsError::from_io(path, e))
            })
            .await?;

        Ok(Box::new(LocalFile {
            path: path.to_string(),
            local_path,
            file,
            hide_temp_files: self.hide_temp_files,
        }))
    }
}

/// Open handle on a local file or directory
pub struct LocalFile {
    path: String,
    local_path: PathBuf,
    file: tokio::fs::File,
    hide_temp_files: bool,
}

impl AsyncRead for LocalFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for LocalFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

#[async_trait]
impl File for LocalFile {
    async fn stat(&self) -> Result<FileInfo, VfsError> {
        let metadata = self
            .file
            .metadata()
            .await
            .map_err(|e| VfsError::from_io(&self.path, e))?;
        Ok(FileInfo::from_metadata(base_name(&self.path), &metadata))
    }

    async fn readdir(&mut self) -> Result<Vec<FileInfo>, VfsError> {
        let metadata = self
            .file
            .metadata()
            .await
            .map_err(|e| VfsError::from_io(&self.path, e))?;
        if !metadata.is_dir() {
            return Err(VfsError::NotADirectory(self.path.clone()));
        }

        let mut read_dir = tokio::fs::read_dir(&self.local_path)
            .await
            .map_err(|e| VfsError::from_io(&self.path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(&self.path, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.hide_temp_files && name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            // Entries can vanish between listing and stat
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            entries.push(FileInfo::from_metadata(name, &metadata));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn close(self: Box<Self>) -> Result<(), VfsError> {
        // tokio::fs::File releases its descriptor on drop
        drop(self.file);
        Ok(())
    }
}
