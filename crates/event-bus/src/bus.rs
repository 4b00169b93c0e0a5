use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{Event, Result};

/// Outcome a consumer reports for a single delivery.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// A prerequisite event (per `causation_id`) has not been observed yet.
    /// The bus holds the delivery and retries it later; successors on the
    /// same aggregate key wait behind it.
    #[error("delivery deferred: {0}")]
    Defer(String),

    /// The handler failed. The bus redelivers up to its ceiling, then drops
    /// the event to the dead-letter log.
    #[error("handler failed: {0}")]
    Failed(String),
}

/// A subscriber receiving events from the bus.
///
/// Delivery is at-least-once: handlers must tolerate duplicates, typically
/// by wrapping themselves with the idempotent apply ledger.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Returns the consumer's name, used for diagnostics and ledger keys.
    fn name(&self) -> &str;

    /// Handles a single delivery.
    async fn handle(&self, event: &Event) -> std::result::Result<(), ConsumerError>;
}

/// Core trait for event bus implementations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an event to every subscription whose topics include the
    /// event's type. Returns once the event is durably recorded; delivery
    /// to consumers is asynchronous.
    async fn publish(&self, event: Event) -> Result<()>;

    /// Registers a consumer for the given topics.
    ///
    /// Previously published events matching the topics are replayed to the
    /// new subscription before live deliveries (catch-up), preserving
    /// per-aggregate-key order throughout.
    async fn subscribe(&self, topics: &[&str], consumer: Arc<dyn EventConsumer>) -> Result<()>;
}
