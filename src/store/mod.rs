//! Local directory backends
//!
//! `LocalFs` serves reads from a directory; `DirStore` adds sandboxed
//! writes on top of it and is the usual cache store.

pub mod dir;
pub mod local;

pub use dir::DirStore;
pub use local::{LocalFile, LocalFs};

/// Suffix of in-flight write files, hidden from listings
pub const TEMP_SUFFIX: &str = ".fscache-tmp";
