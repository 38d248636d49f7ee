use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Bounded exponential backoff with random jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 300,
            backoff_multiplier: 1.5,
            max_jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based), without jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter_ms > 0 {
            rand::rng().random_range(0..=self.max_jitter_ms)
        } else {
            0
        };
        self.backoff_for(attempt) + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryError<E> {
    pub operation: String,
    pub attempts: u32,
    pub retryable: bool,
    pub last_error: E,
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display + Debug,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Retry [{}]: succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(err) => {
                let retryable = is_retryable(&err);
                if !retryable || attempt >= max_attempts {
                    warn!(
                        "Retry [{}]: giving up after attempt {}/{}: {}",
                        operation_name, attempt, max_attempts, err
                    );
                    return Err(RetryError {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        retryable,
                        last_error: err,
                    });
                }

                let delay = policy.delay_for(attempt);
                debug!(
                    "Retry [{}]: attempt {}/{} failed ({}), retrying in {:?}",
                    operation_name, attempt, max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::HostError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &RetryPolicy::default(),
            "headers",
            HostError::is_retryable,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(HostError::ElementNotFound {
                        what: "headers".to_string(),
                    })
                } else {
                    Ok(n)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(
            &RetryPolicy::default(),
            "apply",
            HostError::is_retryable,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HostError::PermissionDenied {
                    reason: "forbidden".to_string(),
                })
            },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(!err.retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(
            &RetryPolicy::default(),
            "rows",
            HostError::is_retryable,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HostError::Transient {
                    reason: "loading".to_string(),
                })
            },
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(450));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(675));
    }
}
