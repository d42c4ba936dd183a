//! Bounded retry with backoff.
//!
//! Every network step of the video pipeline that may need another try goes
//! through [`RetryPolicy`]: either [`RetryPolicy::retry`] for fallible calls
//! or [`RetryPolicy::poll`] for "not ready yet" status checks. Each policy has
//! a fixed attempt budget, so a step either succeeds or fails with a
//! [`RetryError`] after a known worst-case wait.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Classifies errors for retry decisions.
///
/// Errors that are not transient stop a retry loop immediately.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Outcome of an exhausted or aborted retry loop.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; holds the last error.
    Exhausted { attempts: u32, last: E },
    /// Polling never produced a value within the budget.
    TimedOut { attempts: u32 },
    /// A non-transient error ended the loop early.
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The underlying error, if the loop ended on one.
    pub const fn source_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last, .. } | Self::Permanent(last) => Some(last),
            Self::TimedOut { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts, last } => {
                write!(f, "failed after {attempts} attempts: {last}")
            }
            Self::TimedOut { attempts } => write!(f, "not ready after {attempts} attempts"),
            Self::Permanent(err) => write!(f, "{err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source_error().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Attempt budget and delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Same delay between every attempt.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            multiplier: 1,
            max_delay: delay,
        }
    }

    /// Doubling delay starting at `initial_delay`, capped at `max_delay`.
    #[must_use]
    pub const fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier: 2,
            max_delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Worst-case total time spent sleeping between attempts.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// [`RetryError::Permanent`] on the first non-transient error,
    /// [`RetryError::Exhausted`] once every attempt has failed.
    pub async fn retry<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Transient + fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    warn!(operation, attempt, error = %err, "Permanent failure, not retrying");
                    return Err(RetryError::Permanent(err));
                }
                Err(err) if attempt >= max_attempts => {
                    warn!(operation, attempt, error = %err, "Retry budget exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Poll `op` until it yields `Some`, fails permanently, or the budget runs out.
    ///
    /// `Ok(None)` means "not ready yet". Transient errors use up an attempt
    /// the same way.
    ///
    /// # Errors
    ///
    /// [`RetryError::Permanent`] on a non-transient error,
    /// [`RetryError::Exhausted`] if the final attempt errored,
    /// [`RetryError::TimedOut`] if the final attempt was still pending.
    pub async fn poll<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Transient + fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let last_error = match op(attempt).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    debug!(operation, attempt, "Not ready");
                    None
                }
                Err(err) if !err.is_transient() => {
                    warn!(operation, attempt, error = %err, "Permanent failure while polling");
                    return Err(RetryError::Permanent(err));
                }
                Err(err) => {
                    warn!(operation, attempt, error = %err, "Poll attempt failed");
                    Some(err)
                }
            };

            if attempt >= max_attempts {
                return Err(match last_error {
                    Some(last) => RetryError::Exhausted {
                        attempts: attempt,
                        last,
                    },
                    None => RetryError::TimedOut { attempts: attempt },
                });
            }

            tokio::time::sleep(self.delay_after(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(500), Duration::from_secs(3));
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(3));
        assert_eq!(policy.delay_after(40), Duration::from_secs(3));

        let fixed = RetryPolicy::fixed(10, Duration::from_secs(3));
        assert_eq!(fixed.delay_after(7), Duration::from_secs(3));
        assert_eq!(fixed.total_wait(), Duration::from_secs(27));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100));

        let counter = Arc::clone(&calls);
        let result = policy
            .retry("flaky", |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TestError { transient: true })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .retry("always-fails", |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { transient: true }) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_permanent_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(5, Duration::from_millis(100));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .retry("bad-request", |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { transient: false }) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_when_never_ready() {
        let policy = RetryPolicy::fixed(10, Duration::from_secs(3));
        let started = tokio::time::Instant::now();

        let result: Result<(), RetryError<TestError>> =
            policy.poll("asset", |_| async { Ok(None) }).await;

        assert!(matches!(result, Err(RetryError::TimedOut { attempts: 10 })));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(27) && waited < Duration::from_secs(28));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_first_ready_value() {
        let policy = RetryPolicy::fixed(10, Duration::from_secs(3));

        let result: Result<&str, RetryError<TestError>> = policy
            .poll("asset", |attempt| async move {
                Ok((attempt == 4).then_some("asset-123"))
            })
            .await;

        assert_eq!(result.unwrap(), "asset-123");
    }

    #[test]
    fn test_retry_error_display() {
        let err: RetryError<TestError> = RetryError::TimedOut { attempts: 10 };
        assert_eq!(err.to_string(), "not ready after 10 attempts");

        let err = RetryError::Exhausted {
            attempts: 3,
            last: TestError { transient: true },
        };
        assert!(err.to_string().starts_with("failed after 3 attempts"));
    }
}
