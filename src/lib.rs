//! fscache - read-through caching filesystem
//!
//! Puts a local cache store in front of a read-only source. Misses are
//! served straight from the source while the file is copied into the cache
//! in the background; source failures are remembered per path.

pub mod cache;
pub mod config;
pub mod store;
pub mod vfs;

pub use cache::{CacheOptions, CachedFileSystem, PopulateError, PopulatePhase};
pub use config::CacheConfig;
pub use store::{DirStore, LocalFs};
pub use vfs::{Context, File, FileInfo, FileSystem, RwFileSystem, VfsError, WriteFile};
