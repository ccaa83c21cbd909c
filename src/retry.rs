use crate::{Result, SyncError};
use std::future::Future;
use std::time::Duration;

/// Retry behaviour applied to outbound requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before each retry; the last entry repeats once the schedule runs out
    pub backoff: Vec<Duration>,
    /// Response statuses that are worth another attempt
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![Duration::from_secs(2), Duration::from_secs(5)],
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// Single attempt, nothing is retried.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Vec::new(),
            retryable_statuses: Vec::new(),
        }
    }

    /// `max_attempts` attempts with the same delay between each of them.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: vec![delay],
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `retry` (zero based).
    pub fn delay_for(&self, retry: usize) -> Duration {
        self.backoff
            .get(retry)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Transport failures and the configured statuses are retryable; everything
    /// else (auth, parse, API-level rejections) is returned straight away.
    pub fn is_retryable(&self, error: &SyncError) -> bool {
        match error {
            SyncError::Http(_) => true,
            SyncError::Status { status, .. } => self.retryable_statuses.contains(status),
            _ => false,
        }
    }
}

/// Result of a retry operation with context
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The successful result
    pub result: T,
    /// Number of retries made after the first attempt
    pub attempts_made: u32,
    /// Total time spent waiting between attempts
    pub total_retry_time: Duration,
}

/// Execute an async operation under a [`RetryPolicy`].
///
/// # Arguments
/// * `policy` - Retry configuration
/// * `operation_name` - Name of the operation for logging
/// * `operation` - Async function that returns a Result
/// * `on_retry` - Callback invoked before each wait (delay, operation name, error)
pub async fn retry_with_backoff<T, F, Fut, OnRetry>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    mut on_retry: OnRetry,
) -> Result<RetryResult<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    OnRetry: FnMut(Duration, &str, &SyncError),
{
    let mut retries = 0;
    let mut total_retry_time = Duration::ZERO;

    loop {
        match operation().await {
            Ok(result) => {
                return Ok(RetryResult {
                    result,
                    attempts_made: retries,
                    total_retry_time,
                });
            }
            Err(error) if policy.is_retryable(&error) => {
                if retries + 1 >= policy.max_attempts {
                    if policy.max_attempts > 1 {
                        log::warn!(
                            "Max attempts ({}) exceeded for {} operation",
                            policy.max_attempts,
                            operation_name
                        );
                    }
                    return Err(error);
                }

                let delay = policy.delay_for(retries as usize);
                log::info!(
                    "{} failed ({}). Waiting {:?} before attempt {} of {}",
                    operation_name,
                    error,
                    delay,
                    retries + 2,
                    policy.max_attempts
                );
                on_retry(delay, operation_name, &error);

                tokio::time::sleep(delay).await;
                retries += 1;
                total_retry_time += delay;
            }
            Err(other_error) => {
                return Err(other_error);
            }
        }
    }
}

/// Simplified retry function for operations that don't need a retry callback
pub async fn retry_operation<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<RetryResult<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff(policy, operation_name, operation, |delay, op_name, _| {
        log::debug!("Retrying {op_name} after {delay:?}");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let result = retry_operation(&quick(3), "test", || async { Ok::<i32, SyncError>(42) }).await;

        let retry_result = result.unwrap();
        assert_eq!(retry_result.result, 42);
        assert_eq!(retry_result.attempts_made, 0);
        assert_eq!(retry_result.total_retry_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_on_retryable_status() {
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result = retry_operation(&quick(3), "test", move || {
            let count = call_count_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(SyncError::Status {
                        status: 503,
                        url: "https://example.org".to_string(),
                    })
                } else {
                    Ok::<i32, SyncError>(42)
                }
            }
        })
        .await;

        let retry_result = result.unwrap();
        assert_eq!(retry_result.result, 42);
        assert_eq!(retry_result.attempts_made, 2);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_max_attempts_exceeded() {
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result = retry_operation(&quick(3), "test", move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, SyncError>(SyncError::Http("connection reset".to_string())) }
        })
        .await;

        match result.unwrap_err() {
            SyncError::Http(_) => {}
            other => panic!("Expected HTTP error, got: {other:?}"),
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result = retry_operation(&quick(5), "test", move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<i32, SyncError>(SyncError::Status {
                    status: 404,
                    url: "https://example.org".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Status { status: 404, .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_errors_are_not_retryable() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable(&SyncError::Request("Invalid URL".to_string())));
        assert!(policy.is_retryable(&SyncError::Http("connection reset".to_string())));
    }

    #[test]
    fn test_backoff_schedule_repeats_last_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(7), Duration::from_secs(5));
        assert_eq!(RetryPolicy::none().delay_for(0), Duration::ZERO);
    }
}
