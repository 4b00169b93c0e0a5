//! Route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod stock;

use std::sync::Arc;

use event_bus::InMemoryEventBus;
use projections::{InMemoryNotificationSender, SearchIndexView};
use saga::{InMemoryPaymentGateway, InMemoryShippingService};

use crate::{DefaultCoordinator, DefaultEngine};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: DefaultCoordinator,
    pub engine: Arc<DefaultEngine>,
    pub search_index: Arc<SearchIndexView>,
    pub payment: InMemoryPaymentGateway,
    pub shipping: InMemoryShippingService,
    pub bus: Arc<InMemoryEventBus>,
    pub notification_sender: Arc<InMemoryNotificationSender>,
}
