//! Core projection trait.

use async_trait::async_trait;
use event_bus::Event;

use crate::Result;

/// A projection applying events to a derived read model.
///
/// Implementations may assume each event is applied at most once; the
/// `LedgeredConsumer` wrapper enforces that against duplicate deliveries.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection, used as its ledger consumer
    /// key. Must be stable across restarts.
    fn name(&self) -> &'static str;

    /// Applies a single event to the read model.
    async fn apply(&self, event: &Event) -> Result<()>;
}

#[async_trait]
impl<T: Projection + ?Sized> Projection for std::sync::Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn apply(&self, event: &Event) -> Result<()> {
        (**self).apply(event).await
    }
}
