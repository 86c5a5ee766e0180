//! # Publishers
//!
//! A [`Publisher`] delivers one cycle's batch of quotes to one destination, behind
//! its own [`CircuitBreaker`](crate::CircuitBreaker). Breakers are never shared, so a
//! failing destination cannot starve another.
//!
//! | Type | Destination | Delivery |
//! |------|-------------|----------|
//! | [`StoragePublisher`] | HTTP storage service | one request per batch |
//! | [`EventBusPublisher`] | pub/sub channel | one CloudEvent per quote, best effort |

use std::future::Future;
use std::pin::Pin;

use crate::{CircuitState, PublishError, Quote};

pub mod event_bus;
pub mod storage;

pub use event_bus::{
    BusError, CloudEvent, EventBusPublisher, EventBusTransport, QuoteEventData, RedisTransport,
};
pub use storage::{BatchResponse, StoragePublisher};

/// Capability shared by every downstream destination.
pub trait Publisher: Send + Sync {
    /// Destination label used in logs, metrics, and counters.
    fn name(&self) -> &str;

    /// Delivers `quotes` and returns how many the destination accepted.
    ///
    /// An empty batch returns `0` without touching the network.
    fn publish_batch<'a>(
        &'a self,
        quotes: &'a [Quote],
    ) -> Pin<Box<dyn Future<Output = Result<usize, PublishError>> + Send + 'a>>;

    /// Releases connections. The publisher may reconnect lazily if used again.
    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    fn circuit_state(&self) -> CircuitState;

    /// Forces the destination's breaker closed.
    fn reset_circuit(&self);
}
