//! # Quotestream Core
//!
//! Polls a market-data provider on a fixed interval and fans each batch of quotes
//! out to a storage service and a pub/sub event bus.
//!
//! ## Overview
//!
//! - **Validated domain types** for quotes, symbols, sources, and UTC timestamps
//! - **Token-bucket rate limiter** sized by an hourly request budget
//! - **Circuit breaker** per destination, returning a tagged [`CallOutcome`]
//! - **Data source** that retries the provider call on a bounded worker pool
//! - **Publishers** for HTTP batch storage and CloudEvents over Redis
//! - **Orchestrator** running the cooperative fetch/publish loop
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`circuit_breaker`] | Closed/open/half-open state machine |
//! | [`config`] | YAML configuration with environment substitution |
//! | [`data_source`] | `DataSource` trait and the provider-backed implementation |
//! | [`domain`] | Domain models (Quote, Symbol, QuoteSource, UtcDateTime) |
//! | [`error`] | Error taxonomy |
//! | [`http_client`] | HTTP client abstraction |
//! | [`metrics`] | Prometheus metric names and recording helpers |
//! | [`orchestrator`] | Streaming loop |
//! | [`provider`] | Blocking provider seam and the Yahoo chart provider |
//! | [`publisher`] | `Publisher` trait, storage and event bus destinations |
//! | [`rate_limiter`] | Token bucket |
//! | [`retry`] | Backoff and retry policy |
//! | [`worker`] | Bounded pool for blocking calls |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quotestream_core::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("quotestream.yaml")?;
//!
//!     let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
//!     let provider = Arc::new(YahooChartProvider::new(
//!         Arc::clone(&http),
//!         config.provider.base_url.clone(),
//!         config.provider.request_timeout(),
//!     ));
//!     let limiter = Arc::new(RateLimiter::per_hour(config.provider.max_requests_per_hour)?);
//!     let source = Arc::new(ProviderDataSource::new(provider, limiter));
//!
//!     let storage = StoragePublisher::new(
//!         http,
//!         &config.storage.base_url,
//!         config.storage.timeout(),
//!         CircuitBreaker::new("storage", config.storage.circuit_breaker.to_config())?,
//!     );
//!
//!     let orchestrator = StreamingOrchestrator::new(
//!         OrchestratorSettings::from_config(&config)?,
//!         source,
//!         vec![Arc::new(storage)],
//!     );
//!     orchestrator.start().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ StreamingOrchestrator│
//! └──────────┬───────────┘
//!            │ fetch
//!            ▼
//! ┌──────────────────────┐     ┌──────────────┐
//! │ ProviderDataSource   │────▶│ RateLimiter  │
//! │ retry + BlockingPool │     └──────────────┘
//! └──────────┬───────────┘
//!            │ QuoteProvider (blocking)
//!            ▼
//! ┌──────────────────────┐
//! │ Vec<Quote>           │
//! └──────────┬───────────┘
//!            │ publish_batch, in order
//!            ▼
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │ StoragePublisher     │     │ EventBusPublisher    │
//! │ CircuitBreaker       │     │ CircuitBreaker       │
//! │ HTTP POST per batch  │     │ CloudEvent per quote │
//! └──────────────────────┘     └──────────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Nothing in the loop is fatal. Invalid rows are dropped per symbol, a failed fetch
//! backs the loop off, and destination failures are counted and logged:
//!
//! ```rust
//! use quotestream_core::PublishError;
//!
//! fn label(error: &PublishError) -> &'static str {
//!     if error.is_circuit_open() {
//!         "skipped"
//!     } else {
//!         error.error_type()
//!     }
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod publisher;
pub mod rate_limiter;
pub mod retry;
pub mod worker;

// Re-export commonly used types at crate root for convenience

// Circuit breaker
pub use circuit_breaker::{CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration
pub use config::{load_config, parse_config, ConfigError, LogFormat, StreamerConfig};

// Data source
pub use data_source::{observation_to_quote, DataSource, ProviderDataSource};

// Domain models
pub use domain::{
    validate_positive, validate_volume, PriceLevels, Quote, QuoteSource, Symbol, UtcDateTime,
};

// Error types
pub use error::{
    CircuitOpenError, CoreError, FetchError, ProviderError, ProviderErrorKind, PublishError,
    RateLimitTimeout, ValidationError,
};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Metrics
pub use metrics::{init_metrics, MetricsError, StreamerMetrics};

// Orchestrator
pub use orchestrator::{CycleReport, CycleStats, OrchestratorSettings, StreamingOrchestrator};

// Providers
pub use provider::{QuoteProvider, RawObservation, RawTimestamp, YahooChartProvider};

// Publishers
pub use publisher::{
    BatchResponse, BusError, CloudEvent, EventBusPublisher, EventBusTransport, Publisher,
    QuoteEventData, RedisTransport, StoragePublisher,
};

// Rate limiting and retry
pub use rate_limiter::RateLimiter;
pub use retry::{Backoff, RetryConfig, RetryFailure};

// Worker pool
pub use worker::BlockingPool;
