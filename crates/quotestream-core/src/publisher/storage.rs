use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::http_client::{HttpClient, HttpRequest};
use crate::publisher::Publisher;
use crate::{CircuitBreaker, CircuitState, PublishError, Quote};

pub const STORAGE_DESTINATION: &str = "storage";
const BATCH_PATH: &str = "/v1/quotes/batch";

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    quotes: &'a [Quote],
}

/// Storage service acknowledgement. Missing counts are read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub inserted: usize,
    #[serde(default)]
    pub errors: usize,
}

/// Sends each batch as a single JSON POST to the storage service.
pub struct StoragePublisher {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl StoragePublisher {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: &str,
        timeout: Duration,
        breaker: CircuitBreaker,
    ) -> Self {
        let endpoint = format!("{}{BATCH_PATH}", base_url.trim_end_matches('/'));
        info!(%endpoint, timeout_secs = timeout.as_secs(), breaker = breaker.name(), "storage publisher ready");
        Self {
            http_client,
            endpoint,
            timeout,
            breaker,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn publish(&self, quotes: &[Quote]) -> Result<usize, PublishError> {
        if quotes.is_empty() {
            return Ok(0);
        }

        let body = serde_json::to_string(&BatchRequest { quotes })?;
        let response = self
            .breaker
            .call(|| self.post(body))
            .await
            .into_result(|open| PublishError::CircuitOpen {
                destination: STORAGE_DESTINATION.to_owned(),
                source: open,
            })?;

        if response.inserted > quotes.len() {
            warn!(
                batch = quotes.len(),
                inserted = response.inserted,
                "storage reported more rows than were sent, clamping to batch size"
            );
        }
        let inserted = response.inserted.min(quotes.len());

        if response.errors > 0 {
            warn!(
                inserted,
                errors = response.errors,
                "storage reported partial acceptance"
            );
        }
        info!(batch = quotes.len(), inserted, "batch published to storage");
        Ok(inserted)
    }

    async fn post(&self, body: String) -> Result<BatchResponse, PublishError> {
        let request = HttpRequest::post_json(&self.endpoint, body).with_timeout(self.timeout);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| PublishError::Transport {
                destination: STORAGE_DESTINATION.to_owned(),
                message: error.message().to_owned(),
            })?;

        if !response.is_success() {
            return Err(PublishError::Status {
                destination: STORAGE_DESTINATION.to_owned(),
                status: response.status,
                body: response.body,
            });
        }

        debug!(body = %response.body, "storage response");
        serde_json::from_str(&response.body).map_err(|error| PublishError::Decode {
            destination: STORAGE_DESTINATION.to_owned(),
            message: error.to_string(),
        })
    }
}

impl Publisher for StoragePublisher {
    fn name(&self) -> &str {
        STORAGE_DESTINATION
    }

    fn publish_batch<'a>(
        &'a self,
        quotes: &'a [Quote],
    ) -> Pin<Box<dyn Future<Output = Result<usize, PublishError>> + Send + 'a>> {
        Box::pin(self.publish(quotes))
    }

    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            info!("storage publisher closed");
        })
    }

    fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    fn reset_circuit(&self) {
        self.breaker.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_counts_default_to_zero() {
        let parsed: BatchResponse = serde_json::from_str(r#"{"errors": 1}"#).expect("parses");
        assert_eq!(parsed, BatchResponse { inserted: 0, errors: 1 });
    }
}
