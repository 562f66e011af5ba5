//! Bounded retry for "not yet computed" responses.
//!
//! Throttling is never retried here: a rate-limited call ends the filter run.
//! Only [`FetchOutcome::Retryable`] is retried, a fixed number of times with a
//! fixed delay between attempts.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::connector::{ConnectorError, FetchOutcome};
use crate::entity::error_kind::ErrorKind;

/// Default total attempts for a not-ready resource.
pub const DEFAULT_NOT_READY_ATTEMPTS: u32 = 4;

/// Default pause between not-ready attempts, in milliseconds.
pub const DEFAULT_NOT_READY_DELAY_MS: u64 = 2_000;

/// Retry budget for resources the provider computes asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotReadyPolicy {
    /// Total calls, including the first. 0 behaves like 1.
    pub max_attempts: u32,
    /// Pause between calls.
    pub delay: Duration,
}

impl Default for NotReadyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_NOT_READY_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_NOT_READY_DELAY_MS),
        }
    }
}

impl NotReadyPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Build the constant backoff for this budget.
    #[must_use]
    pub fn into_backoff(self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Run `operation` until it stops answering "not ready" or the budget runs out.
///
/// Returns the first non-retryable outcome. When the budget is exhausted the
/// last `Retryable` outcome is returned so the caller can record it.
pub async fn retry_not_ready<T, F, Fut>(
    policy: NotReadyPolicy,
    resource: &str,
    mut operation: F,
) -> FetchOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchOutcome<T>>,
{
    let attempt = AtomicU32::new(0);

    let attempt_once = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        let fut = operation();
        async move {
            match fut.await {
                FetchOutcome::Retryable(err) => Err(err),
                other => Ok(other),
            }
        }
    };

    let result = attempt_once
        .retry(policy.into_backoff())
        .when(|err: &ConnectorError| err.kind() == ErrorKind::TransientNotReady)
        .notify(|err, dur| {
            tracing::debug!(
                resource,
                attempt = attempt.load(Ordering::SeqCst),
                retry_in_ms = dur.as_millis() as u64,
                "{}",
                err
            );
        })
        .await;

    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(
                resource,
                attempts = attempt.load(Ordering::SeqCst),
                "Still not ready after retry budget"
            );
            FetchOutcome::Retryable(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn not_ready() -> ConnectorError {
        ConnectorError::NotReady {
            status: 202,
            resource: "stats".to_string(),
        }
    }

    /// Answers "not ready" `pending` times, then `Data(42)`.
    fn scripted(
        pending: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<FetchOutcome<u32>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < pending {
                FetchOutcome::Retryable(not_ready())
            } else {
                FetchOutcome::Data(42)
            })
        }
    }

    #[test]
    fn test_policy_default() {
        let policy = NotReadyPolicy::default();
        assert_eq!(policy.max_attempts, DEFAULT_NOT_READY_ATTEMPTS);
        assert_eq!(policy.delay, Duration::from_millis(DEFAULT_NOT_READY_DELAY_MS));
        let _backoff = policy.into_backoff();
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_when_budget_covers_not_ready_responses() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = NotReadyPolicy::new(4, Duration::from_secs(2));

        let outcome = retry_not_ready(policy, "stats", scripted(3, Arc::clone(&calls))).await;

        assert!(matches!(outcome, FetchOutcome::Data(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget_and_returns_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = NotReadyPolicy::new(2, Duration::from_secs(2));

        let outcome = retry_not_ready(policy, "stats", scripted(3, Arc::clone(&calls))).await;

        match outcome {
            FetchOutcome::Retryable(err) => assert_eq!(err.status_code(), Some(202)),
            other => panic!("expected exhausted retryable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_fixed_delay_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = NotReadyPolicy::new(3, Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        let _ = retry_not_ready(policy, "stats", scripted(2, Arc::clone(&calls))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn does_not_retry_other_outcomes() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome: FetchOutcome<u32> =
            retry_not_ready(NotReadyPolicy::default(), "detail", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(FetchOutcome::Failed(ConnectorError::Network(
                    "reset".to_string(),
                )))
            })
            .await;

        assert!(matches!(outcome, FetchOutcome::Failed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_budget_still_makes_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = NotReadyPolicy::new(0, Duration::ZERO);

        let outcome = retry_not_ready(policy, "stats", scripted(0, Arc::clone(&calls))).await;

        assert!(matches!(outcome, FetchOutcome::Data(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
