//! Resilience primitives shared by the adapters and the pipeline.

use std::future::Future;
use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};

use crate::error::AdapterResult;

/// Per-source rate limiter.
///
/// Spaces requests by combining a single-permit [`Semaphore`] with a fixed
/// sleep interval.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    interval: Duration,
}

impl RateLimiter {
    /// Allow at most `requests_per_second` requests per second.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::with_interval(Duration::from_millis(
            1000 / u64::from(requests_per_second.max(1)),
        ))
    }

    /// Keep at least `interval` between consecutive requests.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            interval,
        }
    }

    /// Waits until a request slot is available, then holds the slot for
    /// the configured interval to enforce the rate limit.
    pub async fn acquire(&self) {
        // The semaphore is never closed; an error here only means nothing
        // else can be rate limited, so the wait is skipped.
        if let Ok(_permit) = self.semaphore.acquire().await {
            sleep(self.interval).await;
        }
    }
}

/// Default number of attempts per operation, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay before the first retry.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(2);
/// Default cap on the delay between retries.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Bounded exponential backoff for transient adapter errors.
///
/// Only errors for which [`AdapterError::is_transient`] holds are retried;
/// everything else is returned on first occurrence.
///
/// [`AdapterError::is_transient`]: crate::error::AdapterError::is_transient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }

    /// Run `op`, retrying transient failures.
    ///
    /// When a failed attempt carries a `Retry-After` hint and another
    /// attempt remains, that wait is served before the backoff delay.
    /// `what` names the operation in log lines.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> AdapterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 0u32;
        let attempt_once = || {
            attempt += 1;
            let last = attempt >= max_attempts;
            let fut = op();
            async move {
                let result = fut.await;
                if let Err(e) = &result {
                    if let Some(wait) = e.retry_after().filter(|_| !last && e.is_transient()) {
                        log::warn!("{what}: {e}; waiting {wait:?} as requested");
                        sleep(wait).await;
                    }
                }
                result
            }
        };

        attempt_once
            .retry(self.backoff())
            .sleep(sleep)
            .when(|e| e.is_transient())
            .notify(|e, delay| {
                log::warn!("{what} failed ({e}); retrying in {delay:?}");
            })
            .await
    }
}
