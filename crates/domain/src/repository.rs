//! Typed access to persisted orders.

use common::{OrderId, TenantId};
use store::{RecordStore, Version, Versioned};

use crate::error::{DomainError, OrderError};
use crate::order::Order;
use crate::status::OrderStatus;

/// Repository wrapping the tenant-scoped record store for orders.
///
/// The saga coordinator is the only writer; every status change is a
/// conditional write on the version read alongside the order.
pub struct OrderRepository<S> {
    store: S,
}

impl<S> OrderRepository<S>
where
    S: RecordStore<OrderId, Order>,
{
    /// Creates a repository over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persists a freshly created order.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn create(&self, order: &Order) -> Result<Version, DomainError> {
        let version = self
            .store
            .insert(&order.tenant_id, &order.order_id, order.clone())
            .await?;
        metrics::counter!("orders_created_total").increment(1);
        Ok(version)
    }

    /// Loads an order with its current version.
    pub async fn get(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
    ) -> Result<Option<Versioned<Order>>, DomainError> {
        Ok(self.store.get(tenant_id, &order_id).await?)
    }

    /// Loads an order, failing if it does not exist.
    pub async fn get_required(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
    ) -> Result<Versioned<Order>, DomainError> {
        self.get(tenant_id, order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Advances an order to `next`, guarded by the status transition table
    /// and a compare-and-swap on `expected`.
    ///
    /// A `StoreError::VersionConflict` surfaces unchanged so callers can
    /// reload and re-derive their next action.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id, from = %order.status, to = %next))]
    pub async fn transition(
        &self,
        order: &Order,
        next: OrderStatus,
        expected: Version,
    ) -> Result<Versioned<Order>, DomainError> {
        if !order.status.can_transition_to(next) {
            return Err(OrderError::InvalidStatusTransition {
                from: order.status,
                to: next,
            }
            .into());
        }

        let advanced = order.with_status(next);
        let version = self
            .store
            .update(&order.tenant_id, &order.order_id, advanced.clone(), expected)
            .await?;
        metrics::counter!("order_transitions_total", "to" => next.as_str()).increment(1);
        Ok(Versioned::new(advanced, version))
    }

    /// Finds every order of a tenant still in a non-terminal status.
    ///
    /// The recovery scan run on restart to resume interrupted sagas.
    pub async fn find_unfinished(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Versioned<Order>>, DomainError> {
        let mut unfinished: Vec<Versioned<Order>> = self
            .store
            .list_tenant(tenant_id)
            .await?
            .into_iter()
            .filter(|record| record.value.status.is_in_flight())
            .collect();
        unfinished.sort_by_key(|record| record.value.created_at);
        Ok(unfinished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::order::{LineItem, PaymentMethod, ShippingAddress};
    use common::UserId;
    use store::{InMemoryStore, StoreError};

    fn repo() -> OrderRepository<InMemoryStore<OrderId, Order>> {
        OrderRepository::new(InMemoryStore::new())
    }

    fn order(tenant: &str) -> Order {
        Order::new(
            TenantId::new(tenant),
            UserId::new(),
            vec![LineItem::new("p1", 1, Money::from_cents(500))],
            PaymentMethod::new("card-test"),
            ShippingAddress {
                line1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_get() {
        let repo = repo();
        let order = order("t1");
        let version = repo.create(&order).await.unwrap();
        assert_eq!(version, Version::first());

        let loaded = repo
            .get(&order.tenant_id, order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.value, order);
    }

    #[tokio::test]
    async fn get_required_fails_for_missing_order() {
        let repo = repo();
        let result = repo.get_required(&TenantId::new("t1"), OrderId::new()).await;
        assert!(matches!(result, Err(DomainError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn transition_follows_the_table() {
        let repo = repo();
        let order = order("t1");
        let version = repo.create(&order).await.unwrap();

        let advanced = repo
            .transition(&order, OrderStatus::StockReserving, version)
            .await
            .unwrap();
        assert_eq!(advanced.value.status, OrderStatus::StockReserving);
        assert_eq!(advanced.version, version.next());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_before_writing() {
        let repo = repo();
        let order = order("t1");
        let version = repo.create(&order).await.unwrap();

        let result = repo.transition(&order, OrderStatus::Paid, version).await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InvalidStatusTransition { .. }))
        ));

        // Store unchanged
        let loaded = repo
            .get(&order.tenant_id, order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.value.status, OrderStatus::Created);
        assert_eq!(loaded.version, version);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let repo = repo();
        let order = order("t1");
        let version = repo.create(&order).await.unwrap();

        repo.transition(&order, OrderStatus::StockReserving, version)
            .await
            .unwrap();

        let result = repo
            .transition(&order, OrderStatus::StockReserving, version)
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Store(StoreError::VersionConflict { .. }))
        ));
    }

    #[tokio::test]
    async fn find_unfinished_skips_terminal_orders() {
        let repo = repo();
        let tenant = TenantId::new("t1");

        let o1 = order("t1");
        let v1 = repo.create(&o1).await.unwrap();
        let o1 = repo
            .transition(&o1, OrderStatus::StockReserving, v1)
            .await
            .unwrap();
        repo.transition(&o1.value, OrderStatus::Cancelled, o1.version)
            .await
            .unwrap();

        let o2 = order("t1");
        let v2 = repo.create(&o2).await.unwrap();
        repo.transition(&o2, OrderStatus::StockReserving, v2)
            .await
            .unwrap();

        let unfinished = repo.find_unfinished(&tenant).await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].value.order_id, o2.order_id);

        // Other tenants see nothing
        assert!(repo.find_unfinished(&TenantId::new("t2")).await.unwrap().is_empty());
    }
}
