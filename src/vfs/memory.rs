//! In-memory filesystem
//!
//! Keeps file contents in a map and counts every open and create per path.
//! Failures can be injected per path, which makes it the test double for
//! both sources and cache stores.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};
use tracing::trace;

use super::path::clean_rooted;
use super::types::base_name;
use super::{Context, File, FileInfo, FileSystem, RwFileSystem, VfsError, WriteFile};

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    open_failures: HashMap<String, VfsError>,
    create_failure: Option<VfsError>,
    opens: HashMap<String, usize>,
    creates: HashMap<String, usize>,
    latency: Option<Duration>,
}

/// In-memory read-write filesystem
#[derive(Clone)]
pub struct MemoryFs {
    name: String,
    state: Arc<RwLock<State>>,
    modified: SystemTime,
}

impl MemoryFs {
    /// Create an empty filesystem
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(State::default())),
            modified: SystemTime::now(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `data` at `path`
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.write().files.insert(clean_rooted(path), data.into());
    }

    /// Make every open of `path` fail with `err`
    pub fn fail_open(&self, path: &str, err: VfsError) {
        self.write().open_failures.insert(clean_rooted(path), err);
    }

    /// Make every create fail with `err`
    pub fn fail_creates(&self, err: VfsError) {
        self.write().create_failure = Some(err);
    }

    /// Delay every open and create by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = Some(latency);
    }

    /// Contents stored at `path`, if any
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.read().files.get(&clean_rooted(path)).cloned()
    }

    /// Number of times `path` has been opened
    pub fn open_count(&self, path: &str) -> usize {
        self.read().opens.get(&clean_rooted(path)).copied().unwrap_or(0)
    }

    /// Number of times `path` has been created
    pub fn create_count(&self, path: &str) -> usize {
        self.read().creates.get(&clean_rooted(path)).copied().unwrap_or(0)
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().files.is_empty()
    }

    async fn simulate_latency(&self, ctx: &Context) -> Result<(), VfsError> {
        let latency = self.read().latency;
        match latency {
            Some(latency) => {
                ctx.run(async {
                    tokio::time::sleep(latency).await;
                    Ok(())
                })
                .await
            }
            None => ctx.check(),
        }
    }

    /// Immediate children of the directory `key` ("" is the root)
    fn children(&self, key: &str) -> Option<Vec<FileInfo>> {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        };

        let state = self.read();
        let mut entries: BTreeMap<String, FileInfo> = BTreeMap::new();
        for (path, data) in &state.files {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    entries
                        .entry(dir.to_string())
                        .or_insert_with(|| FileInfo::directory(dir, self.modified));
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        FileInfo::file(rest, data.len() as u64, self.modified),
                    );
                }
            }
        }

        if entries.is_empty() && !key.is_empty() {
            return None;
        }
        Some(entries.into_values().collect())
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, ctx: &Context, path: &str) -> Result<Box<dyn File>, VfsError> {
        let key = clean_rooted(path);
        *self.write().opens.entry(key.clone()).or_insert(0) += 1;
        trace!(fs = %self.name, path = %key, "memory open");

        self.simulate_latency(ctx).await?;

        let data = {
            let state = self.read();
            if let Some(err) = state.open_failures.get(&key) {
                return Err(err.clone());
            }
            state.files.get(&key).cloned()
        };

        if let Some(data) = data {
            let info = FileInfo::file(base_name(&key), data.len() as u64, self.modified);
            return Ok(Box::new(MemoryFile::new(info, data, None)));
        }

        match self.children(&key) {
            Some(entries) => {
                let info = FileInfo::directory(base_name(&key), self.modified);
                Ok(Box::new(MemoryFile::new(info, Vec::new(), Some(entries))))
            }
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }
}

#[async_trait]
impl RwFileSystem for MemoryFs {
    async fn create(&self, ctx: &Context, path: &str) -> Result<Box<dyn WriteFile>, VfsError> {
        let key = clean_rooted(path);
        *self.write().creates.entry(key.clone()).or_insert(0) += 1;

        self.simulate_latency(ctx).await?;

        let create_failure = self.read().create_failure.clone();
        if let Some(err) = create_failure {
            return Err(err);
        }

        Ok(Box::new(MemoryWriter {
            key,
            buf: Vec::new(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn wait(&self) -> Result<(), VfsError> {
        Ok(())
    }
}

/// Readable handle over an in-memory snapshot
struct MemoryFile {
    info: FileInfo,
    data: Cursor<Vec<u8>>,
    entries: Option<Vec<FileInfo>>,
}

impl MemoryFile {
    fn new(info: FileInfo, data: Vec<u8>, entries: Option<Vec<FileInfo>>) -> Self {
        Self {
            info,
            data: Cursor::new(data),
            entries,
        }
    }
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

impl AsyncSeek for MemoryFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.data).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.data).poll_complete(cx)
    }
}

#[async_trait]
impl File for MemoryFile {
    async fn stat(&self) -> Result<FileInfo, VfsError> {
        Ok(self.info.clone())
    }

    async fn readdir(&mut self) -> Result<Vec<FileInfo>, VfsError> {
        self.entries
            .clone()
            .ok_or_else(|| VfsError::NotADirectory(self.info.name.clone()))
    }

    async fn close(self: Box<Self>) -> Result<(), VfsError> {
        Ok(())
    }
}

/// Buffers writes and publishes them on close
struct MemoryWriter {
    key: String,
    buf: Vec<u8>,
    state: Arc<RwLock<State>>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.buf).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.buf).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.buf).poll_shutdown(cx)
    }
}

#[async_trait]
impl WriteFile for MemoryWriter {
    async fn close(self: Box<Self>) -> Result<(), VfsError> {
        let MemoryWriter { key, buf, state } = *self;
        state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .files
            .insert(key, buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_open_counts_and_reads() {
        let fs = MemoryFs::new("mem");
        fs.insert("a/b.txt", "hello");

        let ctx = Context::background();
        let mut file = fs.open(&ctx, "/a/./b.txt").await.unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "hello");

        file.seek(SeekFrom::Start(1)).await.unwrap();
        let mut rest = String::new();
        file.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "ello");
        file.close().await.unwrap();

        assert_eq!(fs.open_count("a/b.txt"), 1);
    }

    #[tokio::test]
    async fn test_directory_listing() {
        let fs = MemoryFs::new("mem");
        fs.insert("music/a.mp3", "a");
        fs.insert("music/live/b.mp3", "bb");

        let ctx = Context::background();
        let mut dir = fs.open(&ctx, "music").await.unwrap();
        assert!(dir.stat().await.unwrap().is_dir);

        let entries = dir.readdir().await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "live"]);
        assert!(entries[1].is_dir);

        let mut file = fs.open(&ctx, "music/a.mp3").await.unwrap();
        assert!(matches!(file.readdir().await, Err(VfsError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let fs = MemoryFs::new("mem");
        fs.fail_open("bad", VfsError::Source("upstream down".into()));
        fs.fail_creates(VfsError::PermissionDenied("ro".into()));

        let ctx = Context::background();
        assert!(matches!(fs.open(&ctx, "bad").await, Err(VfsError::Source(_))));
        assert!(matches!(fs.open(&ctx, "missing").await, Err(VfsError::NotFound(_))));
        assert!(fs.create(&ctx, "x").await.is_err());
        assert_eq!(fs.create_count("x"), 1);
    }

    #[tokio::test]
    async fn test_write_visible_after_close() {
        let fs = MemoryFs::new("mem");
        let ctx = Context::background();

        let mut w = fs.create(&ctx, "out.bin").await.unwrap();
        w.write_all(b"data").await.unwrap();
        assert!(fs.contents("out.bin").is_none());

        w.close().await.unwrap();
        assert_eq!(fs.contents("out.bin").unwrap(), b"data");
    }
}
