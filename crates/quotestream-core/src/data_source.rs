//! # Data Source
//!
//! [`DataSource`] is the orchestrator's view of the market-data provider: give it
//! symbols, get back validated [`Quote`]s.
//!
//! [`ProviderDataSource`] composes the resilience pieces around a blocking
//! [`QuoteProvider`]:
//!
//! 1. one [`RateLimiter`] token per `fetch` call (never per symbol, never for an empty set),
//! 2. [`RetryConfig`] around the provider call, retrying connectivity and timeout failures only,
//! 3. the call itself on a [`BlockingPool`] thread,
//! 4. per-symbol translation into `Quote`, dropping rows that fail validation.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::provider::{QuoteProvider, RawObservation, RawTimestamp};
use crate::retry::{RetryConfig, RetryFailure};
use crate::worker::BlockingPool;
use crate::{
    validate_volume, FetchError, Quote, QuoteSource, RateLimitTimeout, RateLimiter, Symbol,
    UtcDateTime, ValidationError,
};

/// Source of validated quotes for a symbol set.
pub trait DataSource: Send + Sync {
    /// Fetches the latest quote for each symbol.
    ///
    /// Symbols with missing or invalid data are left out of the result rather than
    /// failing the call.
    fn fetch<'a>(
        &'a self,
        symbols: &'a [Symbol],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Quote>, FetchError>> + Send + 'a>>;
}

/// Rate-limited, retried, worker-offloaded adapter over a [`QuoteProvider`].
pub struct ProviderDataSource {
    provider: Arc<dyn QuoteProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    pool: BlockingPool,
    acquire_timeout: Option<Duration>,
}

impl ProviderDataSource {
    pub fn new(provider: Arc<dyn QuoteProvider>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            provider,
            limiter,
            retry: RetryConfig::default(),
            pool: BlockingPool::default(),
            acquire_timeout: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pool(mut self, pool: BlockingPool) -> Self {
        self.pool = pool;
        self
    }

    /// Bounds how long `fetch` waits for a rate-limit token. `None` waits indefinitely.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, FetchError> {
        let symbols = dedupe(symbols);
        if symbols.is_empty() {
            debug!("no symbols requested, skipping provider call");
            return Ok(Vec::new());
        }

        if !self.limiter.acquire(self.acquire_timeout).await {
            let waited = self.acquire_timeout.unwrap_or_default();
            warn!(waited_ms = waited.as_millis() as u64, "rate limit token not acquired");
            return Err(RateLimitTimeout { waited }.into());
        }

        let symbols = Arc::new(symbols);
        let outcome = self
            .retry
            .run(|attempt| {
                let provider = Arc::clone(&self.provider);
                let symbols = Arc::clone(&symbols);
                let pool = self.pool.clone();
                async move {
                    debug!(attempt, count = symbols.len(), "calling quote provider");
                    match pool.run(move || provider.fetch(&symbols)).await {
                        Ok(result) => result.map(Ok),
                        Err(worker_error) => Ok(Err(worker_error)),
                    }
                }
            })
            .await;

        let observations = match outcome {
            Ok(Ok(observations)) => observations,
            Ok(Err(worker_error)) => return Err(worker_error),
            Err(RetryFailure { attempts, error }) => {
                warn!(attempts, error = %error, "quote provider failed");
                return Err(FetchError::Provider {
                    attempts,
                    source: error,
                });
            }
        };

        let source = self.provider.source();
        let fetched_at = UtcDateTime::now();
        let quotes: Vec<Quote> = observations
            .into_iter()
            .filter_map(|observation| {
                let symbol = observation.symbol.clone();
                match observation_to_quote(observation, source, fetched_at) {
                    Ok(quote) => Some(quote),
                    Err(error) => {
                        warn!(%symbol, error = %error, "dropping observation");
                        None
                    }
                }
            })
            .collect();

        info!(
            requested = symbols.len(),
            fetched = quotes.len(),
            "fetched quotes"
        );
        Ok(quotes)
    }
}

impl DataSource for ProviderDataSource {
    fn fetch<'a>(
        &'a self,
        symbols: &'a [Symbol],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Quote>, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_quotes(symbols))
    }
}

fn dedupe(symbols: &[Symbol]) -> Vec<Symbol> {
    let mut seen = HashSet::with_capacity(symbols.len());
    symbols
        .iter()
        .filter(|symbol| seen.insert(symbol.as_str()))
        .cloned()
        .collect()
}

/// Validates one provider row. Rows without a timestamp are stamped with `fetched_at`.
pub fn observation_to_quote(
    observation: RawObservation,
    source: QuoteSource,
    fetched_at: UtcDateTime,
) -> Result<Quote, ValidationError> {
    let symbol = Symbol::parse(&observation.symbol)?;
    let price = observation
        .price
        .ok_or(ValidationError::MissingValue { field: "price" })?;
    let volume = observation
        .volume
        .ok_or(ValidationError::MissingValue { field: "volume" })
        .and_then(validate_volume)?;
    let observed_at = match observation.observed_at {
        Some(RawTimestamp::Epoch(seconds)) => UtcDateTime::from_unix_timestamp(seconds)?,
        Some(RawTimestamp::Rfc3339(text)) => UtcDateTime::parse(&text)?,
        None => fetched_at,
    };

    Quote::new(symbol, price, volume, observed_at, source, observation.levels)
}
