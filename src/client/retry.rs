//! Fixed-delay retry and cooperative cancellation.
//!
//! Callers of a [`TextGenerator`](super::TextGenerator) wrap each logical
//! request in [`with_retry`]. Attempts stop early on non-retryable errors
//! or once the [`CancellationToken`] fires.

use crate::models::{Result, RiskError};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay_secs: f64) -> Self {
        Self {
            max_retries,
            delay: Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::ZERO),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 2.0)
    }
}

/// Cooperative cancellation token shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    /// Create a new token (not cancelled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Run `op` until it succeeds, fails permanently or runs out of attempts.
///
/// `op` receives the zero-based attempt number. The last error is returned
/// when every attempt failed.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RiskError::Cancelled);
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() {
            debug!(label, attempt, error = %err, "Not retrying");
            return Err(err);
        }

        warn!(
            label,
            attempt = attempt + 1,
            of = policy.attempts(),
            error = %err,
            "Attempt failed"
        );

        if attempt >= policy.max_retries {
            return Err(err);
        }

        // Hints that are negative, NaN or too large for a Duration are ignored.
        let wait = err
            .retry_after()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map_or(policy.delay, |hint| hint.max(policy.delay));

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => return Err(RiskError::Cancelled),
        }

        attempt += 1;
    }
}
