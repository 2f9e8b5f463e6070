//! Source Failure Cache
//!
//! Remembers the last source error for each path. Entries never expire:
//! once a path has failed it is short-circuited until the process restarts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, trace};

use crate::vfs::VfsError;

/// Per-path memo of source failures
///
/// Lookups take the shared lock, recording takes the exclusive lock.
#[derive(Debug, Default)]
pub struct FailureCache {
    /// Last source error by cleaned path
    errors: RwLock<HashMap<String, VfsError>>,
    /// Lookups answered from the memo
    hits: AtomicU64,
    /// Lookups that found nothing
    misses: AtomicU64,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the memoized error for `path`
    ///
    /// Updates hit/miss counters.
    pub fn get(&self, path: &str) -> Option<VfsError> {
        let errors = self.errors.read().unwrap_or_else(PoisonError::into_inner);
        match errors.get(path) {
            Some(err) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Failure cache HIT");
                Some(err.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Record `err` as the last source error for `path`
    pub fn record(&self, path: &str, err: VfsError) {
        let mut errors = self.errors.write().unwrap_or_else(PoisonError::into_inner);
        debug!(path = path, error = %err, "Memoizing source failure");
        errors.insert(path.to_string(), err);
    }

    /// Number of memoized paths
    pub fn len(&self) -> usize {
        self.errors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get failure cache statistics
    ///
    /// Returns (hits, misses, entries)
    pub fn stats(&self) -> (u64, u64, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.len(),
        )
    }

    /// Log current failure cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, entries) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            entries = entries,
            "Failure cache metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_miss() {
        let cache = FailureCache::new();
        assert!(cache.get("a").is_none());

        cache.record("a", VfsError::NotFound("a".into()));
        assert!(matches!(cache.get("a"), Some(VfsError::NotFound(_))));

        let (hits, misses, entries) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_last_error_wins() {
        let cache = FailureCache::new();
        cache.record("a", VfsError::NotFound("a".into()));
        cache.record("a", VfsError::Source("later".into()));

        assert!(matches!(cache.get("a"), Some(VfsError::Source(_))));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_record_and_get() {
        let cache = std::sync::Arc::new(FailureCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = std::sync::Arc::clone(&cache);
                std::thread::spawn(move || {
                    let path = format!("p{}", i % 4);
                    cache.record(&path, VfsError::Source(path.clone()));
                    assert!(cache.get(&path).is_some());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 4);
    }
}
