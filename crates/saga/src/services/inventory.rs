//! Inventory call seam and the in-process reservation engine adapter.

use async_trait::async_trait;

use common::{OrderId, ProductId, TenantId};
use inventory::{
    InventoryError, InventoryRecord, ReservationEngine, ReservationKey, ReservationRecord,
};
use store::RecordStore;

use crate::retry::StepError;

/// Errors surfaced by inventory calls, classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum InventoryCallError {
    /// Not enough unreserved stock; fails the step immediately.
    #[error(
        "insufficient stock for {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// No reservation exists for the order/product pair.
    #[error("no reservation for order {order_id}, product {product_id}")]
    NotFound {
        order_id: OrderId,
        product_id: ProductId,
    },

    /// Timeout, connection reset, or contention; eligible for retry.
    #[error("transient inventory failure: {0}")]
    Transient(String),

    /// Anything else; not retried.
    #[error("inventory call failed: {0}")]
    Internal(String),
}

impl StepError for InventoryCallError {
    fn is_transient(&self) -> bool {
        matches!(self, InventoryCallError::Transient(_))
    }
}

/// Synchronous inventory operations the saga depends on.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Atomically holds stock for one line item of an order.
    async fn reserve(
        &self,
        tenant_id: &TenantId,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<ReservationRecord, InventoryCallError>;

    /// Releases a hold back to available stock.
    async fn release(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<(), InventoryCallError>;

    /// Consumes a hold on payment success.
    async fn commit(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<(), InventoryCallError>;
}

fn map_engine_error(e: InventoryError) -> InventoryCallError {
    match e {
        InventoryError::InsufficientStock {
            product_id,
            requested,
            available,
        } => InventoryCallError::InsufficientStock {
            product_id,
            requested,
            available,
        },
        InventoryError::ReservationNotFound {
            order_id,
            product_id,
        } => InventoryCallError::NotFound {
            order_id,
            product_id,
        },
        // CAS exhaustion under contention clears up on its own.
        InventoryError::Concurrency { .. } => InventoryCallError::Transient(e.to_string()),
        other => InventoryCallError::Internal(other.to_string()),
    }
}

/// The reservation engine served in-process behind the call seam.
#[async_trait]
impl<IS, RS> InventoryClient for ReservationEngine<IS, RS>
where
    IS: RecordStore<ProductId, InventoryRecord>,
    RS: RecordStore<ReservationKey, ReservationRecord>,
{
    async fn reserve(
        &self,
        tenant_id: &TenantId,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<ReservationRecord, InventoryCallError> {
        ReservationEngine::reserve(self, tenant_id, product_id, quantity, order_id)
            .await
            .map_err(map_engine_error)
    }

    async fn release(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<(), InventoryCallError> {
        ReservationEngine::release(self, tenant_id, order_id, product_id)
            .await
            .map(|_| ())
            .map_err(map_engine_error)
    }

    async fn commit(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<(), InventoryCallError> {
        ReservationEngine::commit(self, tenant_id, order_id, product_id)
            .await
            .map(|_| ())
            .map_err(map_engine_error)
    }
}

#[async_trait]
impl<T: InventoryClient + ?Sized> InventoryClient for std::sync::Arc<T> {
    async fn reserve(
        &self,
        tenant_id: &TenantId,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<ReservationRecord, InventoryCallError> {
        (**self).reserve(tenant_id, product_id, quantity, order_id).await
    }

    async fn release(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<(), InventoryCallError> {
        (**self).release(tenant_id, order_id, product_id).await
    }

    async fn commit(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<(), InventoryCallError> {
        (**self).commit(tenant_id, order_id, product_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{EventBus, InMemoryEventBus};
    use inventory::ReservationState;
    use std::sync::Arc;
    use store::InMemoryStore;

    fn engine() -> ReservationEngine<
        InMemoryStore<ProductId, InventoryRecord>,
        InMemoryStore<ReservationKey, ReservationRecord>,
    > {
        let bus = Arc::new(InMemoryEventBus::new());
        ReservationEngine::new(
            InMemoryStore::new(),
            InMemoryStore::new(),
            bus as Arc<dyn EventBus>,
            0,
        )
    }

    #[tokio::test]
    async fn adapter_maps_rejections() {
        let engine = engine();
        let tenant = TenantId::new("t1");
        let product = ProductId::new("p1");
        engine.set_stock(&tenant, &product, 2).await.unwrap();

        let result =
            InventoryClient::reserve(&engine, &tenant, &product, 5, OrderId::new()).await;
        assert!(matches!(
            result,
            Err(InventoryCallError::InsufficientStock { requested: 5, available: 2, .. })
        ));
    }

    #[tokio::test]
    async fn adapter_round_trips_reserve_and_release() {
        let engine = engine();
        let tenant = TenantId::new("t1");
        let product = ProductId::new("p1");
        let order = OrderId::new();
        engine.set_stock(&tenant, &product, 5).await.unwrap();

        let reservation =
            InventoryClient::reserve(&engine, &tenant, &product, 3, order).await.unwrap();
        assert_eq!(reservation.state, ReservationState::Held);

        InventoryClient::release(&engine, &tenant, order, &product)
            .await
            .unwrap();
        let record = engine.get_record(&tenant, &product).await.unwrap().unwrap();
        assert_eq!(record.reserved, 0);
    }

    #[tokio::test]
    async fn release_without_reservation_is_not_found() {
        let engine = engine();
        let result = InventoryClient::release(
            &engine,
            &TenantId::new("t1"),
            OrderId::new(),
            &ProductId::new("p1"),
        )
        .await;
        assert!(matches!(result, Err(InventoryCallError::NotFound { .. })));
    }
}
