//! Behavior-driven tests for the resilience primitives
//!
//! These tests verify HOW the rate limiter, circuit breaker, and provider-backed
//! data source behave under budget exhaustion, failing dependencies, and bad data.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quotestream_core::{
    CallOutcome, CircuitState, DataSource, FetchError, HttpError, HttpResponse,
    ProviderDataSource, ProviderError, RateLimiter, RawObservation, RawTimestamp, RetryConfig,
    YahooChartProvider,
};
use support::{breaker, observation, symbols, ScriptedHttpClient, ScriptedProvider};
use tokio::time::Instant;

// =============================================================================
// Rate Limiter: Budget Enforcement
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_bucket_is_drained_acquire_gives_up_after_the_timeout() {
    // Given: A 10 requests/hour budget that has been fully spent
    let limiter = RateLimiter::per_hour(10).expect("valid capacity");
    for _ in 0..10 {
        assert!(limiter.acquire(Some(Duration::ZERO)).await);
    }

    // When: A caller waits at most half a second for another token
    let started = Instant::now();
    let acquired = limiter.acquire(Some(Duration::from_millis(500))).await;

    // Then: It gives up after roughly the timeout
    assert!(!acquired);
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_millis(500) && waited < Duration::from_millis(510),
        "waited {waited:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn when_idle_for_a_long_time_tokens_never_exceed_capacity() {
    // Given: A limiter with one token spent
    let limiter = RateLimiter::per_hour(60).expect("valid capacity");
    assert!(limiter.acquire(None).await);

    // When: The limiter sits idle for a day
    tokio::time::advance(Duration::from_secs(86_400)).await;

    // Then: Refill saturates at capacity
    let tokens = limiter.available_tokens().await;
    assert!((tokens - 60.0).abs() < f64::EPSILON, "tokens = {tokens}");
    assert_eq!(limiter.wait_time().await, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn when_bucket_is_empty_wait_time_reports_time_to_next_token() {
    // Given: A 3600/hour budget (one token per second), fully drained
    let limiter = RateLimiter::per_hour(3600).expect("valid capacity");
    for _ in 0..3600 {
        assert!(limiter.acquire(Some(Duration::ZERO)).await);
    }

    // When: A quarter second passes
    tokio::time::advance(Duration::from_millis(250)).await;

    // Then: Three quarters of a second remain until the next token
    let wait = limiter.wait_time().await;
    assert!(
        (wait.as_secs_f64() - 0.75).abs() < 0.001,
        "wait = {wait:?}"
    );

    // And: An unbounded acquire waits for it instead of failing
    let started = Instant::now();
    assert!(limiter.acquire(None).await);
    assert!(started.elapsed() >= Duration::from_millis(749));
}

#[tokio::test(start_paused = true)]
async fn when_many_callers_share_a_limiter_tokens_are_never_double_spent() {
    // Given: Five tokens and twenty concurrent callers with a short deadline
    let limiter = Arc::new(RateLimiter::per_hour(5).expect("valid capacity"));
    let granted = Arc::new(AtomicUsize::new(0));

    // When: They all race for a token
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let limiter = Arc::clone(&limiter);
        let granted = Arc::clone(&granted);
        tasks.push(tokio::spawn(async move {
            if limiter.acquire(Some(Duration::from_millis(100))).await {
                granted.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for task in tasks {
        task.await.expect("task completes");
    }

    // Then: Exactly the budget was handed out and the bucket never went negative
    assert_eq!(granted.load(Ordering::SeqCst), 5);
    assert!(limiter.available_tokens().await >= 0.0);
}

#[test]
fn when_capacity_is_not_positive_construction_fails() {
    assert!(RateLimiter::new(0.0).is_err());
    assert!(RateLimiter::new(-5.0).is_err());
    assert!(RateLimiter::new(f64::NAN).is_err());
}

// =============================================================================
// Circuit Breaker: State Machine
// =============================================================================

async fn fail(breaker: &quotestream_core::CircuitBreaker) -> CallOutcome<(), &'static str> {
    breaker.call(|| async { Err::<(), _>("boom") }).await
}

#[tokio::test(start_paused = true)]
async fn when_failures_reach_threshold_breaker_opens_and_fails_fast() {
    // Given: A breaker that opens after three failures
    let breaker = breaker("storage", 3, Duration::from_secs(60));

    // When: Three consecutive calls fail
    for _ in 0..3 {
        assert!(matches!(fail(&breaker).await, CallOutcome::Failed("boom")));
    }

    // Then: The circuit is open and the next call never runs
    assert_eq!(breaker.state(), CircuitState::Open);
    let invoked = AtomicUsize::new(0);
    let outcome = breaker
        .call(|| async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;
    assert!(outcome.is_circuit_open());
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn when_open_timeout_elapses_one_trial_success_closes_the_circuit() {
    // Given: An open breaker
    let breaker = breaker("event_bus", 2, Duration::from_secs(30));
    fail(&breaker).await;
    fail(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    // When: The timeout passes and the trial call succeeds
    tokio::time::advance(Duration::from_secs(30)).await;
    let outcome = breaker.call(|| async { Ok::<_, &str>(7) }).await;

    // Then: The circuit is closed with no remembered failures
    assert_eq!(outcome, CallOutcome::Ok(7));
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn when_trial_call_fails_breaker_reopens_for_another_timeout() {
    // Given: An open breaker whose timeout has elapsed
    let breaker = breaker("storage", 1, Duration::from_secs(10));
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(10)).await;

    // When: The half-open trial fails
    assert!(matches!(fail(&breaker).await, CallOutcome::Failed(_)));

    // Then: It is open again and rejects until a fresh timeout passes
    assert_eq!(breaker.state(), CircuitState::Open);
    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(fail(&breaker).await.is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn when_operator_resets_an_open_breaker_calls_flow_immediately() {
    // Given: An open breaker well within its timeout
    let breaker = breaker("storage", 1, Duration::from_secs(600));
    fail(&breaker).await;

    // When: It is reset manually
    breaker.reset();

    // Then: The next call runs without waiting for the timeout
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.call(|| async { Ok::<_, &str>(()) }).await.is_ok());
}

// =============================================================================
// Data Source: Fetch Pipeline
// =============================================================================

fn data_source(provider: Arc<ScriptedProvider>, limiter: Arc<RateLimiter>) -> ProviderDataSource {
    ProviderDataSource::new(provider, limiter)
}

#[tokio::test(start_paused = true)]
async fn when_no_symbols_are_requested_no_token_is_spent() {
    // Given: A data source over a small budget
    let provider = ScriptedProvider::returning(Vec::new());
    let limiter = Arc::new(RateLimiter::per_hour(2).expect("valid capacity"));
    let source = data_source(provider.clone(), Arc::clone(&limiter));

    // When: It is asked for nothing
    let quotes = source.fetch(&[]).await.expect("empty fetch succeeds");

    // Then: Nothing is fetched and the budget is untouched
    assert!(quotes.is_empty());
    assert_eq!(provider.calls(), 0);
    assert!((limiter.available_tokens().await - 2.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn when_fetching_many_symbols_only_one_token_is_spent() {
    // Given: Three symbols and a 10/hour budget
    let provider = ScriptedProvider::returning(vec![
        observation("AAPL", 190.0, 100.0),
        observation("MSFT", 410.0, 200.0),
        observation("TSLA", 175.0, 300.0),
    ]);
    let limiter = Arc::new(RateLimiter::per_hour(10).expect("valid capacity"));
    let source = data_source(provider, Arc::clone(&limiter));

    // When: A fetch runs
    let quotes = source
        .fetch(&symbols(&["AAPL", "MSFT", "TSLA"]))
        .await
        .expect("fetch succeeds");

    // Then: All quotes arrive for a single token
    assert_eq!(quotes.len(), 3);
    let remaining = limiter.available_tokens().await;
    assert!((remaining - 9.0).abs() < 0.001, "remaining = {remaining}");
}

#[tokio::test(start_paused = true)]
async fn when_rows_are_incomplete_or_not_utc_they_are_dropped_individually() {
    // Given: A provider response with one good row and three bad ones
    let mut no_price = observation("MSFT", 1.0, 1.0);
    no_price.price = None;
    let mut not_utc = observation("TSLA", 1.0, 1.0);
    not_utc.observed_at = Some(RawTimestamp::Rfc3339(String::from(
        "2024-03-01T10:30:00-05:00",
    )));
    let provider = ScriptedProvider::returning(vec![
        observation("AAPL", 190.0, 100.0),
        no_price,
        not_utc,
        RawObservation::missing("GOOGL"),
    ]);
    let source = data_source(
        provider,
        Arc::new(RateLimiter::per_hour(10).expect("valid capacity")),
    );

    // When: The batch is fetched
    let quotes = source
        .fetch(&symbols(&["AAPL", "MSFT", "TSLA", "GOOGL"]))
        .await
        .expect("fetch succeeds");

    // Then: Only the valid row survives
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].symbol().as_str(), "AAPL");
}

#[tokio::test(start_paused = true)]
async fn when_provider_times_out_twice_the_third_attempt_succeeds() {
    // Given: A provider that times out twice, then answers
    let provider = ScriptedProvider::scripted(
        vec![
            Err(ProviderError::timeout("read timed out")),
            Err(ProviderError::connect("connection refused")),
        ],
        Ok(vec![observation("AAPL", 190.0, 100.0)]),
    );
    let source = data_source(
        provider.clone(),
        Arc::new(RateLimiter::per_hour(10).expect("valid capacity")),
    );

    // When: A fetch runs
    let started = Instant::now();
    let quotes = source
        .fetch(&symbols(&["AAPL"]))
        .await
        .expect("third attempt succeeds");

    // Then: It retried with 1s then 2s of backoff
    assert_eq!(quotes.len(), 1);
    assert_eq!(provider.calls(), 3);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn when_provider_keeps_failing_fetch_error_reports_attempts() {
    // Given: A provider that never connects
    let provider =
        ScriptedProvider::scripted(Vec::new(), Err(ProviderError::connect("connection refused")));
    let source = data_source(
        provider.clone(),
        Arc::new(RateLimiter::per_hour(10).expect("valid capacity")),
    );

    // When: A fetch runs
    let error = source
        .fetch(&symbols(&["AAPL"]))
        .await
        .expect_err("retries exhausted");

    // Then: Three attempts were made and the error says so
    assert_eq!(provider.calls(), 3);
    assert!(
        matches!(error, FetchError::Provider { attempts: 3, .. }),
        "{error:?}"
    );
    assert_eq!(error.error_type(), "fetch_error");
}

#[tokio::test(start_paused = true)]
async fn when_provider_rejects_the_request_it_is_not_retried() {
    // Given: A provider answering with a non-retryable upstream error
    let provider =
        ScriptedProvider::scripted(Vec::new(), Err(ProviderError::upstream("HTTP 401")));
    let source = data_source(
        provider.clone(),
        Arc::new(RateLimiter::per_hour(10).expect("valid capacity")),
    );

    // When: A fetch runs
    let error = source
        .fetch(&symbols(&["AAPL"]))
        .await
        .expect_err("upstream error propagates");

    // Then: Only one attempt was made
    assert_eq!(provider.calls(), 1);
    assert!(matches!(error, FetchError::Provider { attempts: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn when_budget_is_exhausted_fetch_times_out_without_calling_provider() {
    // Given: A drained 10/hour budget and a half-second acquire deadline
    let provider = ScriptedProvider::returning(vec![observation("AAPL", 190.0, 100.0)]);
    let limiter = Arc::new(RateLimiter::per_hour(10).expect("valid capacity"));
    for _ in 0..10 {
        assert!(limiter.acquire(Some(Duration::ZERO)).await);
    }
    let source = data_source(provider.clone(), limiter)
        .with_retry(RetryConfig::no_retry())
        .with_acquire_timeout(Some(Duration::from_millis(500)));

    // When: A fetch runs
    let started = Instant::now();
    let error = source
        .fetch(&symbols(&["AAPL"]))
        .await
        .expect_err("token not available");

    // Then: The fetch gave up after the deadline and the provider was never called
    assert!(matches!(error, FetchError::RateLimited(_)), "{error:?}");
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(provider.calls(), 0);
}

// =============================================================================
// Data Source: Yahoo Chart Provider
// =============================================================================

fn yahoo_source(http: Arc<ScriptedHttpClient>) -> ProviderDataSource {
    let provider = Arc::new(YahooChartProvider::new(
        http,
        "http://chart.test",
        Duration::from_secs(10),
    ));
    ProviderDataSource::new(
        provider,
        Arc::new(RateLimiter::per_hour(100).expect("valid capacity")),
    )
}

#[tokio::test(start_paused = true)]
async fn when_chart_endpoint_returns_bars_the_latest_one_becomes_the_quote() {
    // Given: A chart endpoint with two closed one-minute bars
    let http = ScriptedHttpClient::responding(Ok(HttpResponse::ok_json(
        r#"{"chart":{"result":[{"timestamp":[1709305800,1709305860],
        "indicators":{"quote":[{"open":[180.0,181.0],"high":[182.0,183.0],
        "low":[179.0,180.5],"close":[181.5,182.5],"volume":[1200,900]}]}}],"error":null}}"#,
    )));
    let source = yahoo_source(http.clone());

    // When: One symbol is fetched
    let quotes = source.fetch(&symbols(&["AAPL"])).await.expect("fetch succeeds");

    // Then: The last bar is the observation, stamped with its own UTC time
    assert_eq!(quotes.len(), 1);
    let quote = &quotes[0];
    assert_eq!(quote.price(), 182.5);
    assert_eq!(quote.volume(), 900);
    assert_eq!(quote.levels().previous_close, Some(181.5));
    assert_eq!(quote.observed_at().format_rfc3339(), "2024-03-01T15:11:00Z");
    assert_eq!(
        http.requests()[0].url,
        "http://chart.test/v8/finance/chart/AAPL?range=1d&interval=1m"
    );
}

#[tokio::test(start_paused = true)]
async fn when_chart_endpoint_has_no_data_for_a_symbol_it_is_dropped() {
    let http = ScriptedHttpClient::responding(Ok(HttpResponse::new(404, "not found")));
    let source = yahoo_source(http.clone());

    let quotes = source
        .fetch(&symbols(&["ZZZZZ"]))
        .await
        .expect("missing data is not an error");

    assert!(quotes.is_empty());
    assert_eq!(http.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn when_chart_endpoint_times_out_the_call_is_retried() {
    let http = ScriptedHttpClient::responding(Err(HttpError::timeout("operation timed out")));
    let source = yahoo_source(http.clone());

    let error = source
        .fetch(&symbols(&["AAPL"]))
        .await
        .expect_err("every attempt times out");

    assert!(matches!(error, FetchError::Provider { attempts: 3, .. }));
    assert_eq!(http.request_count(), 3);
}
