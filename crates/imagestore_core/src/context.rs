//! Explicit execution context threaded through every catalog and transfer call.
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Carries cancellation and an optional deadline.
///
/// Contexts derived with [`Context::child`] or [`Context::with_timeout`] are cancelled when
/// their parent is, but cancelling a child leaves the parent untouched.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context whose deadline is the earlier of `deadline` and the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(d) if d < deadline => d,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the context is cancelled or its deadline passes
    /// first, in which case `fut` is dropped.
    pub async fn run<T, E, F>(&self, fut: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        self.check()?;
        let expired = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            res = fut => res,
            _ = self.token.cancelled() => Err(Error::Cancelled.into()),
            _ = expired => Err(Error::DeadlineExceeded.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_parent_cancels_children() {
        let parent = Context::background();
        let child = parent.child();
        assert!(child.check().is_ok());

        parent.cancel();
        assert!(matches!(child.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_alone() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(parent.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_at_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let res: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn run_returns_future_output() {
        let ctx = Context::background();
        let res: Result<u32> = ctx.run(async { Ok(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[test]
    fn earlier_parent_deadline_wins() {
        let now = Instant::now();
        let parent = Context::background().with_deadline(now + Duration::from_secs(1));
        let child = parent.with_deadline(now + Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
