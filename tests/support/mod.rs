//! Shared test doubles for the behaviour suites.
//!
//! Every double implements one of the library's own seams, so no suite needs a
//! network, a broker, or a storage service.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quotestream_core::{
    BusError, CircuitBreaker, CircuitBreakerConfig, EventBusTransport, HttpClient, HttpError,
    HttpRequest, HttpResponse, PriceLevels, ProviderError, Quote, QuoteProvider, QuoteSource,
    RawObservation, RawTimestamp, Symbol, UtcDateTime,
};

pub fn symbols(tickers: &[&str]) -> Vec<Symbol> {
    tickers
        .iter()
        .map(|ticker| Symbol::parse(ticker).expect("valid symbol"))
        .collect()
}

pub fn quote(ticker: &str, price: f64) -> Quote {
    Quote::new(
        Symbol::parse(ticker).expect("valid symbol"),
        price,
        1_000,
        UtcDateTime::parse("2024-03-01T15:30:00Z").expect("valid timestamp"),
        QuoteSource::Yfinance,
        PriceLevels::default(),
    )
    .expect("valid quote")
}

pub fn observation(ticker: &str, price: f64, volume: f64) -> RawObservation {
    RawObservation {
        symbol: ticker.to_owned(),
        price: Some(price),
        volume: Some(volume),
        observed_at: Some(RawTimestamp::Rfc3339(String::from("2024-03-01T15:30:00Z"))),
        levels: PriceLevels::default(),
    }
}

pub fn breaker(name: &str, failure_threshold: u32, open_timeout: Duration) -> CircuitBreaker {
    CircuitBreaker::new(
        name,
        CircuitBreakerConfig {
            failure_threshold,
            open_timeout,
        },
    )
    .expect("valid breaker config")
}

// =============================================================================
// Provider
// =============================================================================

type ProviderResult = Result<Vec<RawObservation>, ProviderError>;

/// Replays scripted results, then repeats the fallback for every later call.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderResult>>,
    fallback: ProviderResult,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn returning(observations: Vec<RawObservation>) -> Arc<Self> {
        Self::scripted(Vec::new(), Ok(observations))
    }

    pub fn scripted(script: Vec<ProviderResult>, fallback: ProviderResult) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QuoteProvider for ScriptedProvider {
    fn source(&self) -> QuoteSource {
        QuoteSource::Yfinance
    }

    fn fetch(&self, _symbols: &[Symbol]) -> Result<Vec<RawObservation>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

// =============================================================================
// HTTP
// =============================================================================

type HttpResult = Result<HttpResponse, HttpError>;

/// Answers every request with the same response and records what was sent.
pub struct ScriptedHttpClient {
    response: Mutex<HttpResult>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn responding(response: HttpResult) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_response(&self, response: HttpResult) {
        *self.response.lock().expect("response lock") = response;
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            self.response.lock().expect("response lock").clone()
        })
    }
}

// =============================================================================
// Event bus
// =============================================================================

/// Collects published payloads. `fail_after` makes every publish past that count fail.
#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<Vec<(String, String)>>,
    fail_after: Mutex<Option<usize>>,
    attempts: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_after(successes: usize) -> Arc<Self> {
        let bus = Self::default();
        *bus.fail_after.lock().expect("fail lock") = Some(successes);
        Arc::new(bus)
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().expect("published lock").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl EventBusTransport for MemoryBus {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + 'a>> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = *self.fail_after.lock().expect("fail lock") {
                if attempt >= limit {
                    return Err(BusError::new("connection reset by peer"));
                }
            }
            self.published
                .lock()
                .expect("published lock")
                .push((channel.to_owned(), payload));
            Ok(())
        })
    }

    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.closes.fetch_add(1, Ordering::SeqCst);
        })
    }
}
