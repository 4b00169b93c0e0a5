use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{EventId, OrderId, ProductId, TenantId};

/// Event type names published on the bus.
///
/// The topic of a subscription is the event type string.
pub mod topics {
    /// An order was paid and entered fulfillment.
    pub const ORDER_CREATED: &str = "order.created";

    /// An order was cancelled after a failed step.
    pub const ORDER_CANCELLED: &str = "order.cancelled";

    /// Compensation exhausted its retries; an operator must intervene.
    pub const ORDER_NEEDS_INTERVENTION: &str = "order.needs_intervention";

    /// Available stock for a product crossed below the configured threshold.
    pub const INVENTORY_LOW: &str = "inventory.low";

    /// A charge was requested from the payment collaborator (choreography).
    pub const PAYMENT_REQUESTED: &str = "payment.requested";

    /// The payment collaborator confirmed a charge.
    pub const PAYMENT_SUCCESS: &str = "payment.success";

    /// The payment collaborator rejected a charge.
    pub const PAYMENT_FAILED: &str = "payment.failed";
}

/// An event published on the bus.
///
/// Immutable once published. The `aggregate_key` determines the ordering
/// scope: deliveries for the same key are sequential, deliveries for
/// different keys are not ordered relative to each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The tenant this event belongs to.
    pub tenant_id: TenantId,

    /// The type of the event (e.g., "order.created").
    pub event_type: String,

    /// The key scoping ordering guarantees (e.g., one order in one tenant).
    pub aggregate_key: String,

    /// The event that caused this one, if any.
    pub causation_id: Option<EventId>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Creates a new event builder.
    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }

    /// Aggregate key for an order within a tenant.
    pub fn order_key(tenant_id: &TenantId, order_id: OrderId) -> String {
        format!("{tenant_id}/order/{order_id}")
    }

    /// Aggregate key for a product within a tenant.
    pub fn product_key(tenant_id: &TenantId, product_id: &ProductId) -> String {
        format!("{tenant_id}/product/{product_id}")
    }
}

/// Builder for constructing events.
#[derive(Debug, Default)]
pub struct EventBuilder {
    event_id: Option<EventId>,
    tenant_id: Option<TenantId>,
    event_type: Option<String>,
    aggregate_key: Option<String>,
    causation_id: Option<EventId>,
    payload: Option<serde_json::Value>,
    occurred_at: Option<DateTime<Utc>>,
}

impl EventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the tenant.
    pub fn tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the aggregate key.
    pub fn aggregate_key(mut self, key: impl Into<String>) -> Self {
        self.aggregate_key = Some(key.into());
        self
    }

    /// Sets the causing event.
    pub fn causation_id(mut self, id: EventId) -> Self {
        self.causation_id = Some(id);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: serde::Serialize>(
        mut self,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the occurrence time. If not set, the current time is used.
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Builds the event.
    ///
    /// # Panics
    ///
    /// Panics if required fields (tenant_id, event_type, aggregate_key,
    /// payload) are not set.
    pub fn build(self) -> Event {
        Event {
            event_id: self.event_id.unwrap_or_default(),
            tenant_id: self.tenant_id.expect("tenant_id is required"),
            event_type: self.event_type.expect("event_type is required"),
            aggregate_key: self.aggregate_key.expect("aggregate_key is required"),
            causation_id: self.causation_id,
            payload: self.payload.expect("payload is required"),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        }
    }
}
