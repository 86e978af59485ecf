//! Request Context
//!
//! Caller-supplied cancellation and deadline that every remote call observes.

use crate::error::{ControlPlaneError, ControlPlaneResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation scope of one operation
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// A context bound to an existing cancellation token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now; an earlier deadline is kept
    ///
    /// A timeout too large to represent adds no deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self;
        };
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run one remote call under this context
    ///
    /// Returns `Cancelled` or `DeadlineExceeded` as soon as either fires; the
    /// call's future is dropped in that case.
    pub async fn run<T, F>(&self, call: F) -> ControlPlaneResult<T>
    where
        F: Future<Output = ControlPlaneResult<T>>,
    {
        if self.is_cancelled() {
            return Err(ControlPlaneError::Cancelled);
        }

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(ControlPlaneError::Cancelled),
                result = call => result,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .map_err(|_| ControlPlaneError::DeadlineExceeded)?,
            None => guarded.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let ctx = RequestContext::new();
        let value = ctx.run(async { Ok::<_, ControlPlaneError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let ctx = RequestContext::new();
        ctx.cancel();

        let result = ctx.run(async { Ok::<_, ControlPlaneError>(()) }).await;
        assert_matches!(result, Err(ControlPlaneError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_during_call() {
        let ctx = RequestContext::new();
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ControlPlaneError>(())
            })
            .await;
        assert_matches!(result, Err(ControlPlaneError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(50));

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ControlPlaneError>(())
            })
            .await;
        assert_matches!(result, Err(ControlPlaneError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_earlier_deadline_wins() {
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(1));
        let first = ctx.deadline().unwrap();
        let ctx = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(first));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_adds_no_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);

        let bounded = RequestContext::new().with_timeout(Duration::from_secs(1));
        let first = bounded.deadline();
        assert_eq!(bounded.with_timeout(Duration::MAX).deadline(), first);

        let value = ctx.run(async { Ok::<_, ControlPlaneError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_is_cancelled_follows_clones() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        assert!(!clone.is_cancelled());
        ctx.cancel();
        assert!(clone.is_cancelled());
    }
}
