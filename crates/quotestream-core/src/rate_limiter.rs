//! Token-bucket admission control for outbound provider calls.
//!
//! The bucket holds at most `capacity` tokens and refills linearly at
//! `capacity / 3600` tokens per second, so `capacity` is an hourly request budget.
//! Waiting callers queue on an async mutex and sleep on the tokio timer; no
//! thread is parked while a token accrues.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::debug;

use crate::ValidationError;

const SECONDS_PER_HOUR: f64 = 3600.0;
const MIN_WAIT: Duration = Duration::from_millis(1);
// With at least one token of capacity the bucket refills a whole token within an hour.
const MAX_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Hourly-budget token bucket shared by every caller of one data source.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_second: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a full bucket. Fails unless `requests_per_hour` is a finite number
    /// of at least one, since a smaller bucket can never hold a whole token.
    pub fn new(requests_per_hour: f64) -> Result<Self, ValidationError> {
        if !requests_per_hour.is_finite() || requests_per_hour < 1.0 {
            return Err(ValidationError::InvalidCapacity {
                capacity: requests_per_hour,
            });
        }

        Ok(Self {
            capacity: requests_per_hour,
            refill_per_second: requests_per_hour / SECONDS_PER_HOUR,
            bucket: Mutex::new(Bucket {
                tokens: requests_per_hour,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn per_hour(requests_per_hour: u32) -> Result<Self, ValidationError> {
        Self::new(f64::from(requests_per_hour))
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// Takes one token, waiting for the bucket to refill if it is empty.
    ///
    /// Returns `false` once `timeout` elapses without a token. `None` waits forever.
    /// Time spent queued behind other callers counts against the timeout. A timeout
    /// too large to represent as a deadline waits forever.
    pub async fn acquire(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        let mut bucket = match deadline {
            Some(deadline) => match timeout_at(deadline, self.bucket.lock()).await {
                Ok(bucket) => bucket,
                Err(_) => return false,
            },
            None => self.bucket.lock().await,
        };

        loop {
            let now = Instant::now();
            self.refill(&mut bucket, now);

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return true;
            }

            let wake_at = now + self.time_to_next_token(bucket.tokens).max(MIN_WAIT);
            match deadline {
                Some(deadline) if deadline <= now => {
                    debug!(tokens = bucket.tokens, "rate limit acquire timed out");
                    return false;
                }
                Some(deadline) => sleep_until(wake_at.min(deadline)).await,
                None => sleep_until(wake_at).await,
            }
        }
    }

    /// Time until a token becomes available. Zero when one can be taken now.
    pub async fn wait_time(&self) -> Duration {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());

        if bucket.tokens >= 1.0 {
            Duration::ZERO
        } else {
            self.time_to_next_token(bucket.tokens)
        }
    }

    /// Current token count after applying any pending refill.
    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(self.capacity);
        bucket.last_refill = now;
    }

    fn time_to_next_token(&self, tokens: f64) -> Duration {
        let seconds = ((1.0 - tokens) / self.refill_per_second).max(0.0);
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT)
    }
}
