//! Downstream projection consumers.
//!
//! Events fanned out by the saga are applied to derived views here. Every
//! consumer wraps its handler with the idempotent apply ledger, so the
//! bus's at-least-once delivery collapses to exactly-once effect: a
//! duplicate delivery is acknowledged and skipped without re-executing
//! side effects.

pub mod consumer;
pub mod error;
pub mod projection;
pub mod views;

use std::sync::Arc;

use event_bus::{EventBus, topics};
use ledger::ApplyLedger;

pub use consumer::LedgeredConsumer;
pub use error::{ProjectionError, Result};
pub use projection::Projection;
pub use views::notifications::{
    InMemoryNotificationSender, Notification, NotificationDispatch, NotificationSender, Recipient,
};
pub use views::search_index::{OrderSearchEntry, SearchIndexView};

/// Subscribes the standard consumers (search index sync, notification
/// dispatch) to the bus, each guarded by the apply ledger.
pub async fn register_consumers(
    bus: &dyn EventBus,
    ledger: Arc<dyn ApplyLedger>,
    search_index: Arc<SearchIndexView>,
    notifications: Arc<NotificationDispatch>,
) -> std::result::Result<(), event_bus::BusError> {
    bus.subscribe(
        &[topics::ORDER_CREATED, topics::ORDER_CANCELLED],
        Arc::new(LedgeredConsumer::new(search_index, Arc::clone(&ledger))),
    )
    .await?;

    bus.subscribe(
        &[
            topics::ORDER_CREATED,
            topics::ORDER_CANCELLED,
            topics::ORDER_NEEDS_INTERVENTION,
            topics::INVENTORY_LOW,
        ],
        Arc::new(LedgeredConsumer::new(notifications, ledger)),
    )
    .await?;

    Ok(())
}
