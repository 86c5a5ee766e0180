use std::fmt::{Display, Formatter};
use std::time::Duration;

use thiserror::Error;

/// Validation failures for quote fields and resilience primitive settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol '{value}' must be 1 to 5 ASCII letters")]
    InvalidSymbol { value: String },

    #[error("invalid source '{value}', expected one of yfinance, fmp, manual")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' is missing")]
    MissingValue { field: &'static str },
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' must be a whole number")]
    FractionalValue { field: &'static str },

    #[error("rate limiter capacity must be at least one request per hour, got {capacity}")]
    InvalidCapacity { capacity: f64 },
    #[error("circuit breaker failure threshold must be positive")]
    InvalidFailureThreshold,
    #[error("circuit breaker open timeout must be positive")]
    InvalidOpenTimeout,
}

/// Raised when a rate-limit token could not be obtained before the caller's deadline.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("rate limit token not available within {waited:?}")]
pub struct RateLimitTimeout {
    pub waited: Duration,
}

/// Failure class reported by a quote provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Connect,
    Timeout,
    Upstream,
    Malformed,
}

/// Error returned by a single provider call, before retries are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Connect,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Upstream,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Malformed,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only connectivity and timeout failures are worth another attempt.
    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Connect | ProviderErrorKind::Timeout
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Connect => "provider.connect",
            ProviderErrorKind::Timeout => "provider.timeout",
            ProviderErrorKind::Upstream => "provider.upstream",
            ProviderErrorKind::Malformed => "provider.malformed",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Errors surfaced by [`DataSource::fetch`](crate::DataSource::fetch).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitTimeout),

    #[error("provider call failed after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("provider worker failed: {0}")]
    Worker(String),
}

impl FetchError {
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limit_timeout",
            Self::Provider { .. } => "fetch_error",
            Self::Worker(_) => "worker_error",
        }
    }
}

/// Fast-fail signal from a breaker, distinct from the wrapped operation's error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("circuit breaker '{breaker}' is open")]
pub struct CircuitOpenError {
    pub breaker: String,
}

/// A destination rejected or could not be reached for a batch or a single item.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{destination} unavailable: {source}")]
    CircuitOpen {
        destination: String,
        #[source]
        source: CircuitOpenError,
    },

    #[error("{destination} transport failure: {message}")]
    Transport {
        destination: String,
        message: String,
    },

    #[error("{destination} responded with status {status}: {body}")]
    Status {
        destination: String,
        status: u16,
        body: String,
    },

    #[error("{destination} returned an unreadable response: {message}")]
    Decode {
        destination: String,
        message: String,
    },

    #[error("{destination} event bus error: {message}")]
    Bus {
        destination: String,
        message: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    /// Stable label used for the `error_type` metric dimension.
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "http_status",
            Self::Decode { .. } => "decode",
            Self::Bus { .. } => "event_bus",
            Self::Serialization(_) => "serialization",
        }
    }

    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Fetch(error) => error.error_type(),
            Self::Publish(error) => error.error_type(),
            Self::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_failures_are_retryable() {
        assert!(ProviderError::connect("refused").retryable());
        assert!(ProviderError::timeout("slow").retryable());
        assert!(!ProviderError::upstream("HTTP 500").retryable());
        assert!(!ProviderError::malformed("bad json").retryable());
    }

    #[test]
    fn publish_error_labels_are_stable() {
        let open = PublishError::CircuitOpen {
            destination: String::from("storage"),
            source: CircuitOpenError {
                breaker: String::from("storage"),
            },
        };
        assert_eq!(open.error_type(), "circuit_open");
        assert!(open.is_circuit_open());

        let status = PublishError::Status {
            destination: String::from("storage"),
            status: 500,
            body: String::from("boom"),
        };
        assert_eq!(status.error_type(), "http_status");
        assert_eq!(
            status.to_string(),
            "storage responded with status 500: boom"
        );
    }
}
