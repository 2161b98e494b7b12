use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Classification of errors for retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// 429 / provider rate limit - retry the same endpoint after a fixed pause
    RateLimit,
    /// Network or 5xx failure - retry with growing delays
    Transport,
    /// Request timed out - retry with growing delays
    Timeout,
    /// Not worth retrying
    Fatal,
}

/// Retry behavior shared by all API clients.
///
/// Transport and timeout failures back off exponentially (doubling from
/// `base_delay_ms`, capped at `max_delay_ms`) with a little random jitter
/// so concurrent scans do not hammer a recovering endpoint in lockstep.
/// Rate limits get a fixed pause instead; growing delays just waste the
/// window the provider already told us to wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry attempts after the initial one
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
    /// Fixed pause after a rate-limit response
    pub rate_limit_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff delay
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            rate_limit_delay_ms: 1_000,
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Base delay before retry number `attempt` (0-indexed), without jitter.
    /// `None` means the error should not be retried.
    pub fn delay_for(&self, attempt: u32, class: RetryClass) -> Option<Duration> {
        match class {
            RetryClass::Fatal => None,
            RetryClass::RateLimit => Some(Duration::from_millis(self.rate_limit_delay_ms)),
            RetryClass::Transport | RetryClass::Timeout => {
                let factor = 1u64 << attempt.min(16);
                let delay = self
                    .base_delay_ms
                    .saturating_mul(factor)
                    .min(self.max_delay_ms);
                Some(Duration::from_millis(delay))
            }
        }
    }

    /// Random delay in `0..=jitter_ms`, added on top of the base delay.
    pub fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        let jitter = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(jitter)
    }
}

/// Retry an async operation according to a [`RetryPolicy`].
///
/// # Arguments
/// * `operation` - The async operation to retry (a closure returning a Future)
/// * `policy` - Retry policy to apply
/// * `classify_error` - Maps an error to its [`RetryClass`]
///
/// # Returns
/// * `Ok(T)` - Operation succeeded (either on first attempt or after retries)
/// * `Err(E)` - Operation failed fatally or all retries were exhausted
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    policy: &RetryPolicy,
    classify_error: impl Fn(&E) -> RetryClass,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("✅ Operation succeeded after {} retry attempts", attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                let class = classify_error(&e);

                if class == RetryClass::Fatal {
                    error!("❌ Operation failed with non-retryable error: {}", e);
                    return Err(e);
                }

                if attempt >= policy.max_attempts {
                    error!(
                        "❌ Operation failed after {} attempts (max retries exhausted): {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = match policy.delay_for(attempt, class) {
                    Some(d) => d + policy.jitter(),
                    None => return Err(e),
                };

                warn!(
                    "⚠️  Operation failed (attempt {}/{}): {} - Retrying in {}ms (error type: {:?})",
                    attempt + 1,
                    policy.max_attempts + 1,
                    e,
                    delay.as_millis(),
                    class
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

    #[derive(Debug)]
    struct TestError {
        kind: &'static str,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.kind)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 40,
            rate_limit_delay_ms: 5,
            jitter_ms: 0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 400,
            rate_limit_delay_ms: 1_000,
            jitter_ms: 0,
        };

        assert_eq!(
            policy.delay_for(0, RetryClass::Transport),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            policy.delay_for(1, RetryClass::Transport),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            policy.delay_for(2, RetryClass::Transport),
            Some(Duration::from_millis(400))
        );
        // capped from here on
        assert_eq!(
            policy.delay_for(5, RetryClass::Transport),
            Some(Duration::from_millis(400))
        );
    }

    #[test]
    fn rate_limit_delay_is_fixed() {
        let policy = fast_policy();
        for attempt in 0..3 {
            assert_eq!(
                policy.delay_for(attempt, RetryClass::RateLimit),
                Some(Duration::from_millis(5))
            );
        }
        assert_eq!(policy.delay_for(0, RetryClass::Fatal), None);
    }

    #[tokio::test]
    async fn immediate_success_does_not_sleep() {
        let result = retry_with_backoff(
            || async { Ok::<_, TestError>(42) },
            &fast_policy(),
            |_| RetryClass::Fatal,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let attempts = std::cell::Cell::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.set(attempts.get() + 1);
                Err::<i32, _>(TestError { kind: "fatal" })
            },
            &fast_policy(),
            |_| RetryClass::Fatal,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let attempts = std::cell::Cell::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 3 {
                    Err(TestError { kind: "transport" })
                } else {
                    Ok(42)
                }
            },
            &fast_policy(),
            |_| RetryClass::Transport,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_return_the_last_error() {
        let attempts = std::cell::Cell::new(0);
        let result = retry_with_backoff(
            || async {
                attempts.set(attempts.get() + 1);
                Err::<i32, _>(TestError { kind: "timeout" })
            },
            &fast_policy(),
            |_| RetryClass::Timeout,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.get(), 4); // Initial + 3 retries
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_grow_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            rate_limit_delay_ms: 1_000,
            jitter_ms: 0,
        };

        let started = tokio::time::Instant::now();
        let attempts = std::cell::Cell::new(0);
        let _ = retry_with_backoff(
            || async {
                attempts.set(attempts.get() + 1);
                Err::<i32, _>(TestError { kind: "transport" })
            },
            &policy,
            |_| RetryClass::Transport,
        )
        .await;

        // 100 + 200 + 400 ms of virtual time
        assert_eq!(started.elapsed(), Duration::from_millis(700));
        assert_eq!(attempts.get(), 4);
    }
}
