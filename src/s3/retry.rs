use std::future::Future;
use std::time::Duration;

use typed_builder::TypedBuilder;

use super::TransportError;

/// Bounded retry with exponential back-off for store operations.
///
/// Only errors for which [TransportError::is_retryable] returns `true` are
/// retried. The delay before retry `n` is `initial_backoff * 2^(n - 1)`,
/// capped at `max_backoff`.
///
/// ```
/// use std::time::Duration;
/// use s3_part_copy::s3::RetryPolicy;
///
/// let policy = RetryPolicy::builder()
///     .max_attempts(5)
///     .initial_backoff(Duration::from_millis(100))
///     .build();
/// assert_eq!(policy.backoff(1), Duration::from_millis(100));
/// assert_eq!(policy.backoff(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Values below 1 are treated as 1.
    #[builder(default = 3)]
    max_attempts: u32,
    #[builder(default = Duration::from_millis(200))]
    initial_backoff: Duration,
    #[builder(default = Duration::from_secs(10))]
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::builder().build()
    }
}

/// The final error of an operation, and how many attempts were made.
#[derive(Debug)]
pub(crate) struct Exhausted {
    pub attempts: u32,
    pub error: TransportError,
}

impl RetryPolicy {
    /// A policy which makes a single attempt.
    pub fn never() -> Self {
        RetryPolicy::builder().max_attempts(1).build()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The delay to wait before making retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `operation` until it succeeds, fails with an error which can not be
    /// retried, or runs out of attempts.
    pub(crate) async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts() => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(attempt, ?delay, %error, "Retrying after transient error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(Exhausted {
                        attempts: attempt,
                        error,
                    })
                }
            }
        }
    }
}
