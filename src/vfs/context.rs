//! Request contexts
//!
//! A `Context` carries a cancellation token and an optional deadline.
//! Filesystem implementations run their I/O through `Context::run` so a
//! cancelled or expired context aborts the operation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::VfsError;

/// Cancellation and deadline scope for a filesystem call
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled together with this one, but cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context that expires at `deadline` (or earlier, if this one does)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done
    pub fn check(&self) -> Result<(), VfsError> {
        if self.token.is_cancelled() {
            return Err(VfsError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(VfsError::Timeout),
            _ => Ok(()),
        }
    }

    /// Run `fut` until it completes or the context is cancelled or expires
    pub async fn run<F, T>(&self, fut: F) -> Result<T, VfsError>
    where
        F: Future<Output = Result<T, VfsError>>,
    {
        self.check()?;

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(VfsError::Cancelled),
            _ = expired => Err(VfsError::Timeout),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::background();
        let value = ctx.run(async { Ok::<_, VfsError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_run() {
        let ctx = Context::background();
        ctx.cancel();
        let result = ctx.run(async { Ok::<_, VfsError>(()) }).await;
        assert!(matches!(result, Err(VfsError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_io() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = ctx
            .run(async {
                std::future::pending::<()>().await;
                Ok::<_, VfsError>(())
            })
            .await;
        assert!(matches!(result, Err(VfsError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, VfsError>(())
            })
            .await;
        assert!(matches!(result, Err(VfsError::Timeout)));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_with_deadline_keeps_earliest() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let later = ctx.with_timeout(Duration::from_secs(100));
        assert_eq!(later.deadline(), ctx.deadline());
    }
}
