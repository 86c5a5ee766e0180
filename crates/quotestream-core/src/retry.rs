//! Retry logic with exponential backoff and optional jitter.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{ProviderError, ProviderErrorKind};

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay to wait after the given failed attempt (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = Duration::from_secs_f64(seconds.min(max.as_secs_f64()));

                if jitter {
                    let jitter_ms = capped.as_millis() as u64 / 2;
                    let offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms = (capped.as_millis() as u64 + offset).saturating_sub(jitter_ms);
                    Duration::from_millis(total_ms)
                } else {
                    capped
                }
            }
        }
    }
}

/// Which failures earn another attempt, and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one. Never less than one.
    pub max_attempts: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
    /// Whether to retry on request timeouts.
    pub retry_on_timeout: bool,
    /// Whether to retry on connection errors.
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

/// Final failure of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

impl RetryConfig {
    /// Create a new retry configuration with exponential backoff.
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base,
                factor: 2.0,
                max,
                jitter: false,
            },
            ..Self::default()
        }
    }

    /// Create a new retry configuration with fixed backoff.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, error: &ProviderError) -> bool {
        match error.kind() {
            ProviderErrorKind::Timeout => self.retry_on_timeout,
            ProviderErrorKind::Connect => self.retry_on_connect,
            ProviderErrorKind::Upstream | ProviderErrorKind::Malformed => false,
        }
    }

    /// Calculate the delay for a given retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryFailure<ProviderError>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts && self.should_retry(&error) => {
                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                    })
                }
            }
        }
    }
}
