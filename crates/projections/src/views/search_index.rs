//! Search index synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, TenantId, UserId};
use event_bus::{Event, topics};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::Projection;

/// A denormalized order document in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSearchEntry {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: String,
    pub total_cents: i64,
    pub product_ids: Vec<ProductId>,
}

/// Keeps the order search index in sync with fan-out events.
///
/// Updates are pure overwrites keyed by `(tenant_id, order_id)`, so a
/// replayed event writes the same document again; the ledger wrapper only
/// spares the redundant work.
#[derive(Default)]
pub struct SearchIndexView {
    entries: RwLock<HashMap<(TenantId, OrderId), OrderSearchEntry>>,
}

impl SearchIndexView {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle used by both the consumer and query side.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Looks up one order's document.
    pub async fn get(&self, tenant_id: &TenantId, order_id: OrderId) -> Option<OrderSearchEntry> {
        self.entries
            .read()
            .await
            .get(&(tenant_id.clone(), order_id))
            .cloned()
    }

    /// Lists a tenant's documents, newest orders last.
    pub async fn list_tenant(&self, tenant_id: &TenantId) -> Vec<OrderSearchEntry> {
        let entries = self.entries.read().await;
        let mut docs: Vec<_> = entries
            .iter()
            .filter(|((tenant, _), _)| tenant == tenant_id)
            .map(|(_, entry)| entry.clone())
            .collect();
        docs.sort_by_key(|d| d.order_id.as_uuid());
        docs
    }

    /// Returns the total number of documents across tenants.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if the index holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Projection for SearchIndexView {
    fn name(&self) -> &'static str {
        "search_index"
    }

    async fn apply(&self, event: &Event) -> Result<()> {
        let order_id: OrderId = serde_json::from_value(event.payload["order_id"].clone())?;
        let user_id: UserId = serde_json::from_value(event.payload["user_id"].clone())?;

        let entry = match event.event_type.as_str() {
            topics::ORDER_CREATED => {
                #[derive(Deserialize)]
                struct Item {
                    product_id: ProductId,
                }
                let items: Vec<Item> =
                    serde_json::from_value(event.payload["line_items"].clone())?;
                OrderSearchEntry {
                    order_id,
                    user_id,
                    status: "completed".to_string(),
                    total_cents: event.payload["total_cents"].as_i64().unwrap_or_default(),
                    product_ids: items.into_iter().map(|i| i.product_id).collect(),
                }
            }
            topics::ORDER_CANCELLED => OrderSearchEntry {
                order_id,
                user_id,
                status: "cancelled".to_string(),
                total_cents: 0,
                product_ids: Vec::new(),
            },
            other => {
                tracing::debug!(event_type = other, "search index ignores event");
                return Ok(());
            }
        };

        self.entries
            .write()
            .await
            .insert((event.tenant_id.clone(), order_id), entry);
        Ok(())
    }
}
