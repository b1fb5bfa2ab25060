//! Request-scoped cancellation and deadline.
//!
//! Every suspension point in the core (store reads and writes, outbound
//! HTTP, retry backoff) runs through [`RequestContext::run`], so an ended
//! context short-circuits before new I/O and aborts I/O already in flight.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a request context ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal plus optional deadline, cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

/// Fires the cancellation of the context it was created with.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with all receivers gone
        self.0.send_replace(true);
    }
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (_tx, cancel) = watch::channel(false);
        Self {
            deadline: None,
            cancel,
        }
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// A cancellable context without a deadline.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, cancel) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel,
            },
            CancelHandle(tx),
        )
    }

    /// Narrows the deadline to at most `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Fails if the context has already ended. Cancellation wins over the deadline.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drives `fut` unless the context ends first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ContextError::Cancelled),
            _ = deadline => Err(ContextError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }

    /// Resolves once the context is cancelled. Never resolves for contexts
    /// whose handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_run_short_circuits() {
        let (ctx, handle) = RequestContext::with_cancel();
        handle.cancel();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = ctx
            .run(async { polled.store(true, std::sync::atomic::Ordering::SeqCst) })
            .await;

        assert_eq!(result, Err(ContextError::Cancelled));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_future() {
        let (ctx, handle) = RequestContext::with_cancel();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.run(std::future::pending::<()>()).await })
        };
        tokio::task::yield_now().await;
        handle.cancel();

        assert_eq!(task.await.unwrap(), Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (ctx, handle) = RequestContext::with_cancel();
        drop(handle);
        assert_eq!(ctx.run(async { "done" }).await, Ok("done"));
    }

    #[test]
    fn test_timeout_only_narrows() {
        let ctx = RequestContext::background();
        let short = ctx.clone().timeout(Duration::from_secs(1));
        let widened = short.clone().timeout(Duration::from_secs(60));
        assert_eq!(short.deadline(), widened.deadline());
    }
}
