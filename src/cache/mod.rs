//! Read-through caching layer
//!
//! `CachedFileSystem` puts an `RwFileSystem` cache store in front of a
//! read-only source, memoizing source failures and populating the cache
//! in the background.

pub mod cached_fs;
pub mod failures;
pub mod pending;
pub mod reports;

pub use cached_fs::{CacheOptions, CachedFileSystem, DEFAULT_REPORT_CAPACITY};
pub use failures::FailureCache;
pub use pending::{PendingTasks, TaskGuard};
pub use reports::{PopulateError, PopulatePhase, ReportSink};
