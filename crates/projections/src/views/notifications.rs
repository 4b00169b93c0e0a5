//! Notification dispatch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{TenantId, UserId};
use event_bus::{Event, topics};

use crate::Result;
use crate::projection::Projection;

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// The customer who placed the order.
    User(UserId),

    /// The tenant's operations team.
    Operators,
}

/// A rendered notification handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
}

/// Transport seam for delivering notifications. The mechanics of email or
/// SMS delivery live behind this boundary.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Delivers one notification.
    async fn send(&self, notification: Notification) -> Result<()>;
}

/// In-memory sender recording every delivery, for tests.
#[derive(Default)]
pub struct InMemoryNotificationSender {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSender {
    /// Creates a new recording sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification delivered so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the number of notifications delivered.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn send(&self, notification: Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Turns fulfillment events into customer and operator notifications.
///
/// Unlike the search index, a notification send is not an overwrite; the
/// ledger wrapper is what keeps duplicate deliveries from re-sending.
pub struct NotificationDispatch {
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatch {
    /// Creates a dispatcher over the given transport.
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Projection for NotificationDispatch {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn apply(&self, event: &Event) -> Result<()> {
        let tenant_id = event.tenant_id.clone();

        let notification = match event.event_type.as_str() {
            topics::ORDER_CREATED => {
                let user_id: UserId = serde_json::from_value(event.payload["user_id"].clone())?;
                Notification {
                    tenant_id,
                    recipient: Recipient::User(user_id),
                    subject: "Your order is confirmed".to_string(),
                    body: format!(
                        "Order {} was paid and is being fulfilled.",
                        event.payload["order_id"].as_str().unwrap_or_default()
                    ),
                }
            }
            topics::ORDER_CANCELLED => {
                let user_id: UserId = serde_json::from_value(event.payload["user_id"].clone())?;
                Notification {
                    tenant_id,
                    recipient: Recipient::User(user_id),
                    subject: "Your order was cancelled".to_string(),
                    body: format!(
                        "Order {} could not be completed: {}",
                        event.payload["order_id"].as_str().unwrap_or_default(),
                        event.payload["reason"].as_str().unwrap_or("unknown reason")
                    ),
                }
            }
            topics::ORDER_NEEDS_INTERVENTION => Notification {
                tenant_id,
                recipient: Recipient::Operators,
                subject: "Order requires manual intervention".to_string(),
                body: format!(
                    "Order {} is parked in FailedManual: {}",
                    event.payload["order_id"].as_str().unwrap_or_default(),
                    event.payload["reason"].as_str().unwrap_or("unknown reason")
                ),
            },
            topics::INVENTORY_LOW => Notification {
                tenant_id,
                recipient: Recipient::Operators,
                subject: "Stock running low".to_string(),
                body: format!(
                    "Product {} has {} units available (threshold {}).",
                    event.payload["product_id"].as_str().unwrap_or_default(),
                    event.payload["available"],
                    event.payload["threshold"]
                ),
            },
            other => {
                tracing::debug!(event_type = other, "notification dispatch ignores event");
                return Ok(());
            }
        };

        self.sender.send(notification).await
    }
}
