//! Retry loop with exponential backoff and per-attempt timeouts.
//!
//! The loop carries its own state (attempt counter, accumulated delay) and
//! never uses errors for control flow. Each attempt receives a child
//! [`CancellationToken`]; when the attempt times out that token is cancelled,
//! which stops the in-flight call without touching the loop itself.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::OrchestratorConfig;
use crate::error::RemoteError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            attempt_timeout: config.timeout,
        }
    }

    /// `min(base * 2^(n-2), max)` for attempt `n > 1`, zero for the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// What the loop did, whatever the result.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, RemoteError>,
    pub attempts: u32,
    /// Sum of the delays slept before attempts.
    pub total_backoff: Duration,
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// `operation` receives the 1-based attempt number and a token that is
/// cancelled when that attempt times out or `cancel` fires. Cancelling
/// `cancel` ends the loop with [`RemoteError::Cancelled`].
pub async fn retry_with_timeout<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32, CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    let mut total_backoff = Duration::ZERO;

    loop {
        attempts += 1;

        let delay = policy.delay_before(attempts);
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return RetryOutcome {
                        result: Err(RemoteError::Cancelled),
                        attempts: attempts - 1,
                        total_backoff,
                    };
                }
                _ = tokio::time::sleep(delay) => {
                    total_backoff += delay;
                }
            }
        }

        info!(attempt = attempts, max_attempts, "Remote generation attempt");

        let attempt_token = cancel.child_token();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemoteError::Cancelled),
            outcome = tokio::time::timeout(
                policy.attempt_timeout,
                operation(attempts, attempt_token.clone()),
            ) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        attempt_token.cancel();
                        Err(RemoteError::Timeout {
                            after: policy.attempt_timeout,
                        })
                    }
                }
            }
        };

        match result {
            Ok(value) => {
                if attempts > 1 {
                    info!(attempt = attempts, "Remote generation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                    total_backoff,
                };
            }
            Err(err)
                if err.is_retryable() && attempts < max_attempts && !cancel.is_cancelled() =>
            {
                warn!(
                    attempt = attempts,
                    max_attempts,
                    error = %err,
                    next_delay = ?policy.delay_before(attempts + 1),
                    "Remote generation attempt failed, retrying"
                );
            }
            Err(err) => {
                error!(
                    attempts,
                    error = %err,
                    "Remote generation failed, retries exhausted"
                );
                return RetryOutcome {
                    result: Err(err),
                    attempts,
                    total_backoff,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = policy(10);
        let delays: Vec<u64> = (1..=7)
            .map(|n| policy.delay_before(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![0, 1000, 2000, 4000, 8000, 10000, 10000]);
        assert_eq!(policy.delay_before(40), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let outcome =
            retry_with_timeout(&policy(3), &CancellationToken::new(), |_, _| async {
                Ok::<_, RemoteError>("ok")
            })
            .await;

        assert_eq!(outcome.result.unwrap(), "ok");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_backoff, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_then_success() {
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = retry_with_timeout(&policy(3), &CancellationToken::new(), |attempt, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    std::future::pending::<()>().await;
                }
                Ok::<_, RemoteError>(attempt)
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.total_backoff, Duration::from_millis(3_000));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let outcome =
            retry_with_timeout(&policy(2), &CancellationToken::new(), |attempt, _| async move {
                Err::<(), _>(RemoteError::HttpStatus {
                    status: 500 + attempt as u16,
                    body: String::new(),
                })
            })
            .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            outcome.result.unwrap_err(),
            RemoteError::HttpStatus {
                status: 502,
                body: String::new()
            }
        );
        assert_eq!(outcome.total_backoff, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_millis(50),
            ..policy(1)
        };
        let outcome = retry_with_timeout(&policy, &CancellationToken::new(), |_, _| async {
            std::future::pending::<Result<(), RemoteError>>().await
        })
        .await;

        assert_eq!(
            outcome.result.unwrap_err(),
            RemoteError::Timeout {
                after: Duration::from_millis(50)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_loop() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = retry_with_timeout(&policy(3), &cancel, |_, _| async {
            std::future::pending::<Result<(), RemoteError>>().await
        })
        .await;

        assert_eq!(outcome.result.unwrap_err(), RemoteError::Cancelled);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_attempt_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = retry_with_timeout(&policy(3), &CancellationToken::new(), |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RemoteError::Cancelled) }
        })
        .await;

        assert_eq!(outcome.result.unwrap_err(), RemoteError::Cancelled);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_backoff, Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
