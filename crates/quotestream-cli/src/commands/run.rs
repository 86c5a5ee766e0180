use std::process::ExitCode;
use std::sync::Arc;

use quotestream_core::{
    init_metrics, load_config, BlockingPool, CircuitBreaker, EventBusPublisher, HttpClient,
    LogFormat, OrchestratorSettings, ProviderDataSource, Publisher, RateLimiter, RedisTransport,
    ReqwestHttpClient, StoragePublisher, StreamerConfig, StreamingOrchestrator,
    YahooChartProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::ConfigArgs;
use crate::error::CliError;
use crate::logging::init_logging;

pub async fn execute(args: &ConfigArgs, log_format: Option<LogFormat>) -> Result<ExitCode, CliError> {
    let config = load_config(&args.config)?;
    init_logging(
        &config.logging.level,
        log_format.unwrap_or(config.logging.format),
    )?;
    info!(
        service = %config.service.name,
        environment = ?config.service.environment,
        config = %args.config.display(),
        "starting quotestream"
    );

    if config.metrics.enabled {
        init_metrics(config.metrics.port)?;
    }

    let orchestrator = build_orchestrator(&config)?;
    listen_for_ctrl_c(orchestrator.cancellation_token());

    let stats = orchestrator.start().await;
    orchestrator.stop().await;

    info!(
        cycles = stats.cycle_count,
        total_fetched = stats.total_fetched,
        "quotestream stopped"
    );
    Ok(ExitCode::SUCCESS)
}

fn build_orchestrator(config: &StreamerConfig) -> Result<StreamingOrchestrator, CliError> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

    let provider = Arc::new(YahooChartProvider::new(
        Arc::clone(&http),
        config.provider.base_url.clone(),
        config.provider.request_timeout(),
    ));
    let limiter = Arc::new(RateLimiter::per_hour(config.provider.max_requests_per_hour)?);
    let source = ProviderDataSource::new(provider, limiter)
        .with_retry(config.provider.retry_config())
        .with_pool(BlockingPool::new(config.provider.max_workers))
        .with_acquire_timeout(config.provider.acquire_timeout());

    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    if config.storage.enabled {
        publishers.push(Arc::new(StoragePublisher::new(
            Arc::clone(&http),
            &config.storage.base_url,
            config.storage.timeout(),
            CircuitBreaker::new("storage", config.storage.circuit_breaker.to_config())?,
        )));
    }
    if config.event_bus.enabled {
        let transport = Arc::new(RedisTransport::new(&config.event_bus.url)?);
        publishers.push(Arc::new(
            EventBusPublisher::new(
                transport,
                config.event_bus.channel.clone(),
                CircuitBreaker::new("event_bus", config.event_bus.circuit_breaker.to_config())?,
            )
            .with_event_identity(
                config.event_bus.event_type.clone(),
                config.event_bus.event_source.clone(),
            ),
        ));
    }
    if publishers.is_empty() {
        warn!("no publishers enabled, quotes will be fetched and discarded");
    }

    Ok(StreamingOrchestrator::new(
        OrchestratorSettings::from_config(config)?,
        Arc::new(source),
        publishers,
    ))
}

fn listen_for_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                token.cancel();
            }
            Err(error) => warn!(error = %error, "failed to listen for Ctrl+C"),
        }
    });
}
