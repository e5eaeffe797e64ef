//! Request-scoped cancellation and deadlines
//!
//! Every backend and storage operation receives a [`RequestContext`]. I/O is
//! the only suspension point, and each I/O future is raced against the
//! context so a cancelled or expired request aborts instead of completing.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled the context
    Cancelled,
    /// The context deadline passed
    DeadlineExceeded,
}

/// Error returned when the context ends before the operation does
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} aborted: {reason:?}")]
pub struct Cancelled {
    /// Operation that was interrupted
    pub operation: String,
    /// Why it was interrupted
    pub reason: CancelReason,
}

/// Cancellation token plus optional deadline carried through a request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Context with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Derive a context that is cancelled with this one but can also be
    /// cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context has been cancelled or has expired
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done
    pub fn check(&self, operation: &str) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            return Err(self.cancelled(operation, CancelReason::Cancelled));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(self.cancelled(operation, CancelReason::DeadlineExceeded));
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context ends first.
    ///
    /// The future is dropped on cancellation, which aborts the outstanding
    /// I/O.
    pub async fn run<F, T, E>(&self, operation: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Cancelled>,
    {
        self.check(operation)?;

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                Err(self.cancelled(operation, CancelReason::Cancelled).into())
            }
            _ = expired => {
                Err(self.cancelled(operation, CancelReason::DeadlineExceeded).into())
            }
            result = fut => result,
        }
    }

    fn cancelled(&self, operation: &str, reason: CancelReason) -> Cancelled {
        Cancelled {
            operation: operation.to_string(),
            reason,
        }
    }
}
