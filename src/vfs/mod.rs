//! Virtual filesystem capabilities
//!
//! A `FileSystem` opens paths and hands back readable, seekable handles.
//! An `RwFileSystem` can also create files. Handles must be released with
//! `close()`; a written file is only visible once its `close()` succeeds.

pub mod context;
pub mod errors;
pub mod memory;
pub mod path;
pub mod types;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

pub use context::Context;
pub use errors::VfsError;
pub use memory::MemoryFs;
pub use types::FileInfo;

/// A readable handle returned by `FileSystem::open`
#[async_trait]
pub trait File: AsyncRead + AsyncSeek + Send + Unpin {
    /// Metadata for the opened path
    async fn stat(&self) -> Result<FileInfo, VfsError>;

    /// List the entries of an opened directory, sorted by name
    async fn readdir(&mut self) -> Result<Vec<FileInfo>, VfsError>;

    /// Release the handle
    async fn close(self: Box<Self>) -> Result<(), VfsError>;
}

/// A writable handle returned by `RwFileSystem::create`
#[async_trait]
pub trait WriteFile: AsyncWrite + Send + Unpin {
    /// Flush and publish the written data
    ///
    /// Until this returns `Ok`, nothing written can be assumed to be stored.
    async fn close(self: Box<Self>) -> Result<(), VfsError>;

    /// Release the handle without publishing anything written
    async fn abort(self: Box<Self>) -> Result<(), VfsError> {
        drop(self);
        Ok(())
    }
}

/// Read-only filesystem capability
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Human readable description, used in logs
    fn name(&self) -> &str;

    /// Open `path` for reading
    async fn open(&self, ctx: &Context, path: &str) -> Result<Box<dyn File>, VfsError>;
}

/// Read-write filesystem capability
#[async_trait]
pub trait RwFileSystem: FileSystem {
    /// Create (or replace) the file at `path`
    async fn create(&self, ctx: &Context, path: &str) -> Result<Box<dyn WriteFile>, VfsError>;

    /// Wait until pending writes have completed
    async fn wait(&self) -> Result<(), VfsError>;
}
