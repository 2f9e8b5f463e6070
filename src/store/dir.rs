//! Sandboxed Local Directory Store
//!
//! Read-write filesystem confined to a root directory. Every path is
//! resolved to an absolute location and rejected if it would land outside
//! the root. Writes go to a hidden temp file next to the target and are
//! persisted over it when the handle is closed.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::local::LocalFs;
use super::TEMP_SUFFIX;
use crate::vfs::path::clean_path;
use crate::vfs::{Context, File, FileSystem, RwFileSystem, VfsError, WriteFile};

/// Read-write filesystem rooted at a local directory
#[derive(Debug, Clone)]
pub struct DirStore {
    local: LocalFs,
    root: PathBuf,
}

impl DirStore {
    /// Create a store rooted at `root`
    ///
    /// The root itself is created lazily by the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            local: LocalFs::new(root.clone()).hiding_temp_files(),
            root,
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` to an absolute location inside the root
    ///
    /// The parent directory of the resolved path must be the root or one
    /// of its descendants. Nothing on disk is touched.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, VfsError> {
        let mut joined = self.root.as_os_str().to_owned();
        joined.push("/");
        joined.push(path);
        let cleaned = clean_path(Path::new(&joined));

        let abs_path = std::path::absolute(&cleaned)
            .map(|p| clean_path(&p))
            .map_err(|e| VfsError::from_io(path, e))?;
        let abs_root = std::path::absolute(&self.root)
            .map(|p| clean_path(&p))
            .map_err(|e| VfsError::from_io(path, e))?;

        let parent = abs_path.parent().unwrap_or(Path::new("/"));
        if !parent.starts_with(&abs_root) {
            return Err(VfsError::PathEscape {
                path: path.to_string(),
                parent: parent.to_path_buf(),
                root: abs_root,
            });
        }

        Ok(abs_path)
    }

    /// Remove temp files left behind by interrupted writes
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        let stale = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(TEMP_SUFFIX));

        for entry in stale {
            debug!(path = %entry.path().display(), "Removing stale temp file");
            if std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(root = %self.root.display(), removed = removed, "Removed stale temp files");
        }
        removed
    }
}

#[async_trait]
impl FileSystem for DirStore {
    fn name(&self) -> &str {
        self.local.name()
    }

    async fn open(&self, ctx: &Context, path: &str) -> Result<Box<dyn File>, VfsError> {
        self.local.open(ctx, path).await
    }
}

#[async_trait]
impl RwFileSystem for DirStore {
    async fn create(&self, ctx: &Context, path: &str) -> Result<Box<dyn WriteFile>, VfsError> {
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        ctx.run(async {
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(|e| VfsError::from_io(path, e))
        })
        .await?;

        let temp = ctx
            .run(async {
                let dir = parent.clone();
                tokio::task::spawn_blocking(move || {
                    let mut builder = tempfile::Builder::new();
                    builder.prefix(".").suffix(TEMP_SUFFIX);
                    // Published files get the usual 0666 & !umask, not 0600
                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        builder.permissions(std::fs::Permissions::from_mode(0o666));
                    }
                    builder.tempfile_in(dir)
                })
                .await
                .map_err(io::Error::other)
                .and_then(|created| created)
                .map_err(|e| VfsError::from_io(path, e))
            })
            .await?;

        let (file, temp_path) = temp.into_parts();
        debug!(path = %path, target = %target.display(), "Created cache file");

        Ok(Box::new(DirWriter {
            path: path.to_string(),
            target,
            file: tokio::fs::File::from_std(file),
            temp_path,
        }))
    }

    async fn wait(&self) -> Result<(), VfsError> {
        Ok(())
    }
}

/// Writable handle that publishes its temp file on close
///
/// Dropping the handle without closing it deletes the temp file.
struct DirWriter {
    path: String,
    target: PathBuf,
    file: tokio::fs::File,
    temp_path: TempPath,
}

impl AsyncWrite for DirWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

#[async_trait]
impl WriteFile for DirWriter {
    async fn close(self: Box<Self>) -> Result<(), VfsError> {
        let DirWriter {
            path,
            target,
            mut file,
            temp_path,
        } = *self;

        file.flush().await.map_err(|e| VfsError::from_io(&path, e))?;
        file.sync_all().await.map_err(|e| VfsError::from_io(&path, e))?;
        drop(file);

        temp_path
            .persist(&target)
            .map_err(|e| VfsError::from_io(&path, e.error))?;

        debug!(path = %path, target = %target.display(), "Persisted cache file");
        Ok(())
    }
}
