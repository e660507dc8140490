//! Retry coordinator: bounded retries of whole transfer attempts on
//! optimistic lock conflicts.
//!
//! The coordinator sleeps only between attempts, never inside one. Both the
//! running attempt and the backoff wait race against the caller's
//! [`Cancellation`]; whichever fires first wins, and dropping an attempt
//! drops its transaction, which rolls it back.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::LedgerError;

/// Attempt bound and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Default number of attempts, counting the first.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// Default backoff base.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);

    /// Creates a policy. `max_attempts` is raised to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Total attempts allowed, counting the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry `retry` (0-indexed): `base_delay * 2^retry`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

/// Caller-side cancellation: an optional deadline and an optional explicit
/// cancel signal.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    signal: Option<watch::Receiver<bool>>,
}

/// Fires the paired [`Cancellation`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels every clone of the paired [`Cancellation`].
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Cancellation {
    /// A cancellation that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// A cancellation that fires `timeout` from now. A timeout past the
    /// clock's range never fires.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(at) => Self::never().deadline(at),
            None => Self::never(),
        }
    }

    /// A cancellation fired through the returned [`CancelHandle`].
    #[must_use]
    pub fn manual() -> (CancelHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle { sender },
            Self {
                deadline: None,
                signal: Some(receiver),
            },
        )
    }

    /// Sets (or tightens) the deadline.
    #[must_use]
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(at, |current| current.min(at)));
        self
    }

    /// Returns the error for an already-fired cancellation.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Cancelled`] if the signal fired, otherwise
    /// [`LedgerError::DeadlineExceeded`] if the deadline has passed.
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.signal.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(LedgerError::Cancelled);
        }
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return Err(LedgerError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Completes when the cancellation fires, yielding the matching error.
    /// Pends forever for [`Cancellation::never`].
    pub async fn fired(&self) -> LedgerError {
        let mut signal = self.signal.clone();
        let cancelled = async {
            if let Some(rx) = signal.as_mut() {
                if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                    return LedgerError::Cancelled;
                }
            }
            std::future::pending().await
        };
        let expired = async {
            match self.deadline {
                Some(at) => {
                    tokio::time::sleep_until(at).await;
                    LedgerError::DeadlineExceeded
                }
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            err = cancelled => err,
            err = expired => err,
        }
    }
}

/// Runs an attempt repeatedly while it fails with a version conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
}

impl RetryCoordinator {
    /// Creates a coordinator with `policy`.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `attempt` (passed the 1-based attempt number) until it succeeds,
    /// fails with a non-retryable error, or the attempt bound is reached.
    /// Returns the value and the number of attempts used.
    ///
    /// # Errors
    ///
    /// - Any non-retryable error from `attempt`, unchanged.
    /// - [`LedgerError::ExhaustedRetries`] wrapping the last conflict.
    /// - [`LedgerError::Cancelled`] / [`LedgerError::DeadlineExceeded`] if
    ///   `cancel` fires during an attempt or a backoff wait.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &Cancellation,
        mut attempt: F,
    ) -> Result<(T, u32), LedgerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempts = 0;
        loop {
            cancel.check()?;
            attempts += 1;

            let outcome = tokio::select! {
                biased;
                err = cancel.fired() => return Err(err),
                outcome = attempt(attempts) => outcome,
            };

            let conflict = match outcome {
                Ok(value) => return Ok((value, attempts)),
                Err(LedgerError::Conflict(conflict)) => conflict,
                Err(err) => return Err(err),
            };

            if attempts >= self.policy.max_attempts {
                tracing::warn!(
                    attempts,
                    account_id = %conflict.account_id,
                    "giving up after repeated optimistic lock conflicts"
                );
                return Err(LedgerError::ExhaustedRetries {
                    attempts,
                    last: conflict,
                });
            }

            let delay = self.policy.delay_for(attempts - 1);
            tracing::debug!(
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                account_id = %conflict.account_id,
                "retrying after optimistic lock conflict"
            );
            tokio::select! {
                biased;
                err = cancel.fired() => return Err(err),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
