//! Blocking market-data provider contract and the Yahoo chart implementation.
//!
//! A provider returns loosely-typed [`RawObservation`]s; turning them into validated
//! quotes is the data source's job, so a provider never rejects a whole batch because
//! one symbol came back incomplete.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::debug;

use crate::http_client::{HttpClient, HttpErrorKind, HttpRequest};
use crate::{PriceLevels, ProviderError, QuoteSource, Symbol};

/// Observation timestamp as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTimestamp {
    /// Seconds since the Unix epoch, implicitly UTC.
    Epoch(i64),
    /// RFC3339 text. Must carry a UTC offset to be accepted.
    Rfc3339(String),
}

/// One symbol's row as returned by a provider, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub symbol: String,
    pub price: Option<f64>,
    pub volume: Option<f64>,
    pub observed_at: Option<RawTimestamp>,
    pub levels: PriceLevels,
}

impl RawObservation {
    /// A row for a symbol the provider had no data for.
    pub fn missing(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: None,
            volume: None,
            observed_at: None,
            levels: PriceLevels::default(),
        }
    }
}

/// Blocking provider call. Implementations run on a worker thread, never on the runtime.
pub trait QuoteProvider: Send + Sync + 'static {
    /// Tag stamped on every quote built from this provider's observations.
    fn source(&self) -> QuoteSource;

    fn fetch(&self, symbols: &[Symbol]) -> Result<Vec<RawObservation>, ProviderError>;
}

pub const YAHOO_CHART_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Latest one-minute bar per symbol from the Yahoo chart endpoint.
#[derive(Clone)]
pub struct YahooChartProvider {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl YahooChartProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    fn chart_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=1d&interval=1m",
            self.base_url,
            urlencoding::encode(symbol.as_str())
        )
    }

    fn fetch_one(&self, runtime: &Handle, symbol: &Symbol) -> Result<RawObservation, ProviderError> {
        let request = HttpRequest::get(self.chart_url(symbol))
            .with_header("accept", "application/json")
            .with_timeout(self.timeout);

        let response = runtime
            .block_on(self.http_client.execute(request))
            .map_err(|error| match error.kind() {
                HttpErrorKind::Connect => ProviderError::connect(error.message()),
                HttpErrorKind::Timeout => ProviderError::timeout(error.message()),
                HttpErrorKind::Other => ProviderError::upstream(error.message()),
            })?;

        if response.status == 404 {
            debug!(%symbol, "provider has no chart for symbol");
            return Ok(RawObservation::missing(symbol.as_str()));
        }
        if !response.is_success() {
            return Err(ProviderError::upstream(format!(
                "chart request for {symbol} returned status {}",
                response.status
            )));
        }

        parse_chart(symbol, &response.body)
    }
}

impl QuoteProvider for YahooChartProvider {
    fn source(&self) -> QuoteSource {
        QuoteSource::Yfinance
    }

    fn fetch(&self, symbols: &[Symbol]) -> Result<Vec<RawObservation>, ProviderError> {
        let runtime = Handle::try_current()
            .map_err(|error| ProviderError::upstream(format!("no async runtime: {error}")))?;

        symbols
            .iter()
            .map(|symbol| self.fetch_one(&runtime, symbol))
            .collect()
    }
}

/// Picks the most recent bar with a close; the bar before it supplies the previous close.
pub(crate) fn parse_chart(symbol: &Symbol, body: &str) -> Result<RawObservation, ProviderError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|error| ProviderError::malformed(format!("failed to parse chart: {error}")))?;

    let Some(result) = response.chart.result.and_then(|results| results.into_iter().next()) else {
        debug!(%symbol, error = ?response.chart.error, "chart response carried no result");
        return Ok(RawObservation::missing(symbol.as_str()));
    };
    let Some(bars) = result.indicators.quote.into_iter().next() else {
        return Ok(RawObservation::missing(symbol.as_str()));
    };
    let timestamps = result.timestamp.unwrap_or_default();

    let closed_rows: Vec<usize> = (0..timestamps.len())
        .filter(|&row| value_at(&bars.close, row).is_some())
        .collect();
    let Some(&last) = closed_rows.last() else {
        return Ok(RawObservation::missing(symbol.as_str()));
    };
    let previous = closed_rows.iter().rev().nth(1).copied();

    Ok(RawObservation {
        symbol: symbol.as_str().to_owned(),
        price: value_at(&bars.close, last),
        volume: value_at(&bars.volume, last),
        observed_at: timestamps.get(last).copied().map(RawTimestamp::Epoch),
        levels: PriceLevels {
            open: value_at(&bars.open, last),
            high: value_at(&bars.high, last),
            low: value_at(&bars.low, last),
            previous_close: previous.and_then(|row| value_at(&bars.close, row)),
            ..PriceLevels::default()
        },
    })
}

fn value_at(values: &[Option<f64>], row: usize) -> Option<f64> {
    values.get(row).copied().flatten()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartBars>,
}

#[derive(Debug, Deserialize)]
struct ChartBars {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}
