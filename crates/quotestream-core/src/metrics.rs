//! Prometheus metrics for the streaming loop.
//!
//! Recording goes through the `metrics` facade, so every call is a no-op until a
//! recorder is installed with [`init_metrics`].
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `streamer_quotes_fetched_total` | counter | |
//! | `streamer_quotes_published_total` | counter | `destination` |
//! | `streamer_errors_total` | counter | `error_type` |
//! | `streamer_publish_errors_total` | counter | `destination`, `error_type` |
//! | `streamer_fetch_duration_seconds` | histogram | |
//! | `streamer_publish_duration_seconds` | histogram | `destination` |
//! | `streamer_loop_duration_seconds` | histogram | |
//! | `streamer_active_symbols` | gauge | |
//! | `streamer_circuit_breaker_state` | gauge | `publisher` |

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use thiserror::Error;
use tracing::info;

use crate::CircuitState;

pub const QUOTES_FETCHED: &str = "streamer_quotes_fetched_total";
pub const QUOTES_PUBLISHED: &str = "streamer_quotes_published_total";
pub const ERRORS: &str = "streamer_errors_total";
pub const PUBLISH_ERRORS: &str = "streamer_publish_errors_total";
pub const FETCH_DURATION: &str = "streamer_fetch_duration_seconds";
pub const PUBLISH_DURATION: &str = "streamer_publish_duration_seconds";
pub const LOOP_DURATION: &str = "streamer_loop_duration_seconds";
pub const ACTIVE_SYMBOLS: &str = "streamer_active_symbols";
pub const CIRCUIT_BREAKER_STATE: &str = "streamer_circuit_breaker_state";

pub const CALL_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];
pub const LOOP_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics exporter setup failed: {0}")]
    Exporter(#[from] BuildError),
}

/// Builds the exporter with the histogram buckets used by the streaming loop.
pub fn prometheus_builder() -> Result<PrometheusBuilder, MetricsError> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(FETCH_DURATION.to_owned()), CALL_DURATION_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(PUBLISH_DURATION.to_owned()), CALL_DURATION_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(LOOP_DURATION.to_owned()), LOOP_DURATION_BUCKETS)?;
    Ok(builder)
}

/// Installs the global recorder and serves `/metrics` on `port`.
pub fn init_metrics(port: u16) -> Result<(), MetricsError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    prometheus_builder()?.with_http_listener(addr).install()?;
    describe_metrics();

    info!(%addr, "metrics server listening");
    Ok(())
}

pub fn describe_metrics() {
    describe_counter!(QUOTES_FETCHED, "Quotes fetched from the provider");
    describe_counter!(QUOTES_PUBLISHED, "Quotes accepted by a destination");
    describe_counter!(ERRORS, "Errors by type");
    describe_counter!(PUBLISH_ERRORS, "Publish errors by destination and type");
    describe_histogram!(FETCH_DURATION, "Provider fetch duration in seconds");
    describe_histogram!(PUBLISH_DURATION, "Batch publish duration in seconds");
    describe_histogram!(LOOP_DURATION, "Full cycle duration in seconds");
    describe_gauge!(ACTIVE_SYMBOLS, "Symbols polled each cycle");
    describe_gauge!(
        CIRCUIT_BREAKER_STATE,
        "Circuit breaker state per publisher (0 closed, 1 open, 2 half-open)"
    );
}

/// Recording helpers used by the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamerMetrics;

impl StreamerMetrics {
    pub fn record_fetch(&self, fetched: usize, elapsed: Duration) {
        counter!(QUOTES_FETCHED).increment(fetched as u64);
        histogram!(FETCH_DURATION).record(elapsed.as_secs_f64());
    }

    pub fn record_published(&self, destination: &str, accepted: usize, elapsed: Duration) {
        counter!(QUOTES_PUBLISHED, "destination" => destination.to_owned())
            .increment(accepted as u64);
        histogram!(PUBLISH_DURATION, "destination" => destination.to_owned())
            .record(elapsed.as_secs_f64());
    }

    pub fn record_publish_error(&self, destination: &str, error_type: &'static str) {
        counter!(
            PUBLISH_ERRORS,
            "destination" => destination.to_owned(),
            "error_type" => error_type
        )
        .increment(1);
        self.record_error(error_type);
    }

    pub fn record_error(&self, error_type: &'static str) {
        counter!(ERRORS, "error_type" => error_type).increment(1);
    }

    pub fn record_cycle(&self, elapsed: Duration) {
        histogram!(LOOP_DURATION).record(elapsed.as_secs_f64());
    }

    pub fn set_active_symbols(&self, count: usize) {
        gauge!(ACTIVE_SYMBOLS).set(count as f64);
    }

    pub fn set_circuit_state(&self, publisher: &str, state: CircuitState) {
        gauge!(CIRCUIT_BREAKER_STATE, "publisher" => publisher.to_owned()).set(state.gauge_value());
    }
}
