use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How often and how patiently a request is repeated after a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy::new(0, 0);

    pub const fn new(retries: usize, delay_ms: u64) -> Self {
        Self {
            retries,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 500)
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or the policy runs out of attempts. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    policy: RetryPolicy,
    mut operation: F,
    is_transient: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if attempt > policy.retries || !is_transient(&err) => return Err(err),
            Err(err) => {
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt,
                    policy.retries + 1,
                    err
                );
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = with_retry(
            RetryPolicy::new(3, 1),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("busy {n}")) } else { Ok(n) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_last_attempt() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = with_retry(
            RetryPolicy::new(2, 1),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = with_retry(
            RetryPolicy::default(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("bad request".to_string())
            },
            |e: &String| !e.starts_with("bad"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
