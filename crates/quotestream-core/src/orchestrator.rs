//! # Streaming Orchestrator
//!
//! One cooperative loop per instance: fetch, publish to each destination in order,
//! record, sleep. Cycles never overlap.
//!
//! - A destination failure (including an open circuit) is logged and counted; the
//!   next destination still gets the batch.
//! - A failed fetch ends the cycle early and the loop waits a fixed error backoff
//!   instead of the polling interval.
//! - A panic inside a cycle is caught at the loop, counted as `panic`, and handled
//!   like a failed fetch.
//! - Cancellation is observed between cycles and during the sleep.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::StreamerConfig;
use crate::metrics::StreamerMetrics;
use crate::{CoreError, DataSource, Publisher, Symbol, ValidationError};

pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

const PANIC_ERROR_TYPE: &str = "panic";

/// Loop timing and the symbol set polled each cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub symbols: Vec<Symbol>,
    pub polling_interval: Duration,
    pub error_backoff: Duration,
}

impl OrchestratorSettings {
    pub fn new(symbols: Vec<Symbol>, polling_interval: Duration) -> Self {
        Self {
            symbols,
            polling_interval,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    pub fn from_config(config: &StreamerConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(config.symbols()?, config.polling_interval()))
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

/// Outcome of a single cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub fetched: usize,
    pub published: BTreeMap<String, usize>,
    pub failed_destinations: Vec<String>,
}

/// Cumulative counters since the orchestrator was built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub running: bool,
    pub cycle_count: u64,
    pub total_fetched: u64,
    pub published: BTreeMap<String, u64>,
}

impl CycleStats {
    pub fn published_to(&self, destination: &str) -> u64 {
        self.published.get(destination).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Totals {
    cycle_count: u64,
    total_fetched: u64,
    published: BTreeMap<String, u64>,
}

pub struct StreamingOrchestrator {
    settings: OrchestratorSettings,
    data_source: Arc<dyn DataSource>,
    publishers: Vec<Arc<dyn Publisher>>,
    running: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
    // Held by `start` for the lifetime of the loop; `stop` waits on it before closing.
    loop_guard: tokio::sync::Mutex<()>,
    totals: Mutex<Totals>,
    metrics: StreamerMetrics,
}

impl StreamingOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        data_source: Arc<dyn DataSource>,
        publishers: Vec<Arc<dyn Publisher>>,
    ) -> Self {
        info!(
            symbols = settings.symbols.len(),
            interval_secs = settings.polling_interval.as_secs_f64(),
            publishers = publishers.len(),
            "streaming orchestrator initialized"
        );
        Self {
            settings,
            data_source,
            publishers,
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            loop_guard: tokio::sync::Mutex::new(()),
            totals: Mutex::new(Totals::default()),
            metrics: StreamerMetrics,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Token that ends the loop when cancelled. Child tokens may be handed to other tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> CycleStats {
        let totals = self.totals();
        CycleStats {
            running: self.is_running(),
            cycle_count: totals.cycle_count,
            total_fetched: totals.total_fetched,
            published: totals.published.clone(),
        }
    }

    /// Runs cycles until [`stop`](Self::stop) is called or the token is cancelled,
    /// then returns the final counters.
    pub async fn start(&self) -> CycleStats {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("orchestrator already running");
            return self.stats();
        }
        let _loop_guard = self.loop_guard.lock().await;

        self.metrics.set_active_symbols(self.settings.symbols.len());
        info!(
            symbols = ?self.settings.symbols.iter().map(Symbol::as_str).collect::<Vec<_>>(),
            "streaming started"
        );

        while self.is_running() && !self.cancel.is_cancelled() {
            let pause = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(report)) => {
                    debug!(cycle = report.cycle, fetched = report.fetched, "cycle complete");
                    self.settings.polling_interval
                }
                Ok(Err(error)) => {
                    error!(error = %error, "cycle failed, backing off");
                    self.metrics.record_error(error.error_type());
                    self.settings.error_backoff
                }
                Err(payload) => {
                    error!(panic = panic_message(payload.as_ref()), "cycle panicked, backing off");
                    self.metrics.record_error(PANIC_ERROR_TYPE);
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("cancellation received during sleep");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.finalize()
    }

    /// Fetches once and publishes the batch to every destination in order.
    ///
    /// Only a fetch failure is returned; destination failures are recorded in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        let started = Instant::now();
        let cycle = {
            let mut totals = self.totals();
            totals.cycle_count += 1;
            totals.cycle_count
        };

        let fetch_started = Instant::now();
        let quotes = self.data_source.fetch(&self.settings.symbols).await?;
        self.metrics.record_fetch(quotes.len(), fetch_started.elapsed());
        self.totals().total_fetched += quotes.len() as u64;

        let mut report = CycleReport {
            cycle,
            fetched: quotes.len(),
            ..CycleReport::default()
        };

        if quotes.is_empty() {
            debug!(cycle, "no quotes fetched, nothing to publish");
        } else {
            for publisher in &self.publishers {
                let destination = publisher.name();
                let publish_started = Instant::now();
                match publisher.publish_batch(&quotes).await {
                    Ok(accepted) => {
                        self.metrics
                            .record_published(destination, accepted, publish_started.elapsed());
                        *self
                            .totals()
                            .published
                            .entry(destination.to_owned())
                            .or_default() += accepted as u64;
                        report.published.insert(destination.to_owned(), accepted);
                    }
                    Err(error) => {
                        if error.is_circuit_open() {
                            warn!(cycle, destination, "circuit open, batch skipped");
                        } else {
                            error!(cycle, destination, error = %error, "publish failed");
                        }
                        self.metrics
                            .record_publish_error(destination, error.error_type());
                        report.failed_destinations.push(destination.to_owned());
                    }
                }
            }
        }

        self.record_circuit_states();
        self.metrics.record_cycle(started.elapsed());
        info!(
            cycle,
            fetched = report.fetched,
            published = ?report.published,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle finished"
        );
        Ok(report)
    }

    /// Ends the loop and closes every publisher. Later calls are no-ops.
    ///
    /// A cycle already in flight finishes before any publisher is closed.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _loop_guard = self.loop_guard.lock().await;
        for publisher in &self.publishers {
            publisher.close().await;
        }
        info!("streaming stopped, publishers closed");
    }

    fn finalize(&self) -> CycleStats {
        self.record_circuit_states();
        let stats = self.stats();
        info!(
            cycles = stats.cycle_count,
            total_fetched = stats.total_fetched,
            published = ?stats.published,
            "streaming loop exited"
        );
        stats
    }

    fn record_circuit_states(&self) {
        for publisher in &self.publishers {
            self.metrics
                .set_circuit_state(publisher.name(), publisher.circuit_state());
        }
    }

    fn totals(&self) -> MutexGuard<'_, Totals> {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
