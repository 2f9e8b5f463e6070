//! Pending task tracking
//!
//! Counts in-flight background tasks so callers can wait for them to
//! settle. A task must be registered before it is spawned; the guard it
//! gets back marks it finished when dropped, including on panic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    idle: Notify,
}

/// Set of in-flight background tasks
#[derive(Debug, Clone, Default)]
pub struct PendingTasks {
    inner: Arc<Inner>,
}

/// Marks one registered task as in flight until dropped
#[derive(Debug)]
pub struct TaskGuard {
    inner: Arc<Inner>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task that is about to be spawned
    pub fn register(&self) -> TaskGuard {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        TaskGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of tasks still in flight
    pub fn len(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until no registered task is in flight
    ///
    /// Tasks registered while waiting are waited for too.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a wakeup between the
            // check and the await is not lost
            notified.as_mut().enable();

            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_with_nothing_pending() {
        let pending = PendingTasks::new();
        pending.wait().await;
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_guards_drop() {
        let pending = PendingTasks::new();
        let first = pending.register();
        let second = pending.register();
        assert_eq!(pending.len(), 2);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(first);
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(second);
        });

        pending.wait().await;
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_registered_before_spawn_is_seen() {
        let pending = PendingTasks::new();
        let guard = pending.register();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
            true
        });

        // The task has not started yet, but wait() must still see it
        pending.wait().await;
        assert!(pending.is_empty());
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_released_on_panic() {
        let pending = PendingTasks::new();
        let guard = pending.register();
        let result = tokio::spawn(async move {
            let _guard = guard;
            panic!("populate blew up");
        })
        .await;

        assert!(result.is_err());
        pending.wait().await;
        assert!(pending.is_empty());
    }
}
