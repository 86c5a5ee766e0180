use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{CircuitOpenError, ValidationError};

/// Runtime circuit state of one downstream destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding: 0 closed, 1 open, 2 half-open.
    pub const fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::InvalidFailureThreshold);
        }
        if self.open_timeout.is_zero() {
            return Err(ValidationError::InvalidOpenTimeout);
        }
        Ok(())
    }
}

/// Result of a call routed through a [`CircuitBreaker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T, E> {
    /// The operation ran and succeeded.
    Ok(T),
    /// The breaker rejected the call; the operation was never invoked.
    CircuitOpen(CircuitOpenError),
    /// The operation ran and failed.
    Failed(E),
}

impl<T, E> CallOutcome<T, E> {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }

    /// Collapses the outcome into a `Result`, mapping the open signal into the caller's error type.
    pub fn into_result(self, on_open: impl FnOnce(CircuitOpenError) -> E) -> Result<T, E> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::CircuitOpen(open) => Err(on_open(open)),
            Self::Failed(error) => Err(error),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            trial_in_flight: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Three-state breaker guarding one downstream destination.
///
/// State transitions are serialized by an internal mutex, so one instance may be
/// shared between tasks. While a half-open trial call is in flight, any other
/// caller is rejected as if the circuit were still open.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            inner: Mutex::new(CircuitInner::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Runs `op` unless the circuit is open.
    ///
    /// The first call after `open_timeout` elapses becomes the half-open trial; its
    /// result alone decides whether the circuit closes or reopens.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> CallOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(open) => return CallOutcome::CircuitOpen(open),
        };

        let mut trial = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };
        let result = op().await;
        trial.armed = false;

        match result {
            Ok(value) => {
                self.record_success();
                CallOutcome::Ok(value)
            }
            Err(error) => {
                self.record_failure();
                CallOutcome::Failed(error)
            }
        }
    }

    /// Forces the circuit closed with zero failures, bypassing the open timeout.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = CircuitInner::default();
        info!(breaker = %self.name, "circuit breaker manually reset to closed");
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn last_failure_at(&self) -> Option<Instant> {
        self.lock().last_failure_at
    }

    fn admit(&self) -> Result<Admission, CircuitOpenError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Ok(Admission::Trial)
            }
            CircuitState::HalfOpen => Err(self.open_error()),
            CircuitState::Open => {
                let can_probe = inner
                    .last_failure_at
                    .map(|failed_at| failed_at.elapsed() >= self.config.open_timeout)
                    .unwrap_or(true);

                if can_probe {
                    info!(breaker = %self.name, "circuit breaker half-open, allowing trial call");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                } else {
                    warn!(breaker = %self.name, "circuit breaker open, rejecting call");
                    Err(self.open_error())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(breaker = %self.name, "circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());
        inner.trial_in_flight = false;

        let should_open = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if should_open {
            if inner.state != CircuitState::Open {
                warn!(
                    breaker = %self.name,
                    failures = inner.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "circuit breaker opened"
                );
            }
            inner.state = CircuitState::Open;
        }
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError {
            breaker: self.name.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the half-open trial slot if the trial future is dropped before completing.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}
