use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::StreamerMetrics;
use crate::publisher::Publisher;
use crate::{
    CallOutcome, CircuitBreaker, CircuitState, PublishError, Quote, QuoteSource, Symbol, UtcDateTime,
};

pub const EVENT_BUS_DESTINATION: &str = "event_bus";
pub const DEFAULT_EVENT_TYPE: &str = "io.quotestream.quotes.price-updated";
pub const DEFAULT_EVENT_SOURCE: &str = "quotestream";

const SPEC_VERSION: &str = "1.0";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Pub/sub transport failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BusError {
    message: String,
}

impl BusError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for BusError {
    fn from(error: redis::RedisError) -> Self {
        Self::new(error.to_string())
    }
}

/// Channel publish seam so the publisher can run without a live broker.
pub trait EventBusTransport: Send + Sync {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + 'a>>;

    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Redis PUBLISH over a lazily opened multiplexed connection.
pub struct RedisTransport {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisTransport {
    pub fn new(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BusError> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut connection).await?;
        info!("event bus connection established");

        *slot = Some(connection.clone());
        Ok(connection)
    }

    async fn send(&self, channel: &str, payload: String) -> Result<(), BusError> {
        let mut connection = self.connection().await?;
        let result: Result<i64, redis::RedisError> = connection.publish(channel, payload).await;
        match result {
            Ok(receivers) => {
                debug!(channel, receivers, "event published");
                Ok(())
            }
            Err(error) => {
                // Force a reconnect on the next publish.
                self.connection.lock().await.take();
                Err(error.into())
            }
        }
    }
}

impl EventBusTransport for RedisTransport {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + 'a>> {
        Box::pin(self.send(channel, payload))
    }

    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if self.connection.lock().await.take().is_some() {
                info!("event bus connection closed");
            }
        })
    }
}

/// Quote payload inside a [`CloudEvent`]. Absent levels are emitted as `null`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEventData {
    pub symbol: Symbol,
    pub price: f64,
    pub volume: u64,
    pub observed_at: UtcDateTime,
    pub source: QuoteSource,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
}

impl From<&Quote> for QuoteEventData {
    fn from(quote: &Quote) -> Self {
        let levels = quote.levels();
        Self {
            symbol: quote.symbol().clone(),
            price: quote.price(),
            volume: quote.volume(),
            observed_at: quote.observed_at(),
            source: quote.source(),
            bid: levels.bid,
            ask: levels.ask,
            open: levels.open,
            high: levels.high,
            low: levels.low,
            previous_close: levels.previous_close,
        }
    }
}

/// CloudEvents 1.0 structured-mode envelope.
#[derive(Debug, Clone, Serialize)]
pub struct CloudEvent {
    pub specversion: &'static str,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub id: Uuid,
    pub time: UtcDateTime,
    pub datacontenttype: &'static str,
    pub data: QuoteEventData,
}

impl CloudEvent {
    /// Wraps `quote` with a fresh id and the current time.
    pub fn price_updated(quote: &Quote, event_type: &str, source: &str) -> Self {
        Self {
            specversion: SPEC_VERSION,
            event_type: event_type.to_owned(),
            source: source.to_owned(),
            id: Uuid::new_v4(),
            time: UtcDateTime::now(),
            datacontenttype: JSON_CONTENT_TYPE,
            data: QuoteEventData::from(quote),
        }
    }
}

/// Publishes each quote as its own event; a failed item never aborts the rest.
pub struct EventBusPublisher {
    transport: Arc<dyn EventBusTransport>,
    channel: String,
    event_type: String,
    event_source: String,
    breaker: CircuitBreaker,
    metrics: StreamerMetrics,
}

impl EventBusPublisher {
    pub fn new(
        transport: Arc<dyn EventBusTransport>,
        channel: impl Into<String>,
        breaker: CircuitBreaker,
    ) -> Self {
        let channel = channel.into();
        info!(%channel, breaker = breaker.name(), "event bus publisher ready");
        Self {
            transport,
            channel,
            event_type: DEFAULT_EVENT_TYPE.to_owned(),
            event_source: DEFAULT_EVENT_SOURCE.to_owned(),
            breaker,
            metrics: StreamerMetrics,
        }
    }

    pub fn with_event_identity(mut self, event_type: impl Into<String>, source: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self.event_source = source.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn publish(&self, quotes: &[Quote]) -> Result<usize, PublishError> {
        if quotes.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        let mut published = 0;
        for quote in quotes {
            match self.publish_one(quote).await {
                Ok(()) => published += 1,
                Err(error) => {
                    if error.is_circuit_open() {
                        debug!(symbol = %quote.symbol(), "event bus circuit open, skipping quote");
                    } else {
                        error!(symbol = %quote.symbol(), error = %error, "failed to publish quote event");
                    }
                    self.metrics
                        .record_publish_error(EVENT_BUS_DESTINATION, error.error_type());
                }
            }
        }

        if published < quotes.len() {
            warn!(
                published,
                batch = quotes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "event bus batch partially published"
            );
        } else {
            info!(published, channel = %self.channel, "batch published to event bus");
        }
        Ok(published)
    }

    async fn publish_one(&self, quote: &Quote) -> Result<(), PublishError> {
        let event = CloudEvent::price_updated(quote, &self.event_type, &self.event_source);
        let payload = serde_json::to_string(&event)?;

        match self
            .breaker
            .call(|| self.transport.publish(&self.channel, payload))
            .await
        {
            CallOutcome::Ok(()) => Ok(()),
            CallOutcome::CircuitOpen(open) => Err(PublishError::CircuitOpen {
                destination: EVENT_BUS_DESTINATION.to_owned(),
                source: open,
            }),
            CallOutcome::Failed(error) => Err(PublishError::Bus {
                destination: EVENT_BUS_DESTINATION.to_owned(),
                message: error.to_string(),
            }),
        }
    }
}

impl Publisher for EventBusPublisher {
    fn name(&self) -> &str {
        EVENT_BUS_DESTINATION
    }

    fn publish_batch<'a>(
        &'a self,
        quotes: &'a [Quote],
    ) -> Pin<Box<dyn Future<Output = Result<usize, PublishError>> + Send + 'a>> {
        Box::pin(self.publish(quotes))
    }

    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.transport.close().await;
            info!("event bus publisher closed");
        })
    }

    fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    fn reset_circuit(&self) {
        self.breaker.reset();
    }
}
