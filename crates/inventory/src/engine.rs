//! The reservation engine: reserve, commit, release.

use std::sync::Arc;

use common::{OrderId, ProductId, TenantId};
use event_bus::{Event, EventBus, topics};
use store::{RecordStore, StoreError};

use crate::error::{InventoryError, Result};
use crate::records::{InventoryRecord, ReservationKey, ReservationRecord, ReservationState};

/// Internal compare-and-swap retries before surfacing a concurrency error.
const MAX_CAS_RETRIES: u32 = 16;

/// Atomic reserve/release/commit operations on per-product stock counters.
///
/// Serialization happens on the inventory record's version: concurrent
/// writers to the same tenant/product retry their read-modify-write, while
/// other products and tenants never contend. Reservation records make each
/// operation idempotent on `(order, product)`.
pub struct ReservationEngine<IS, RS> {
    records: IS,
    reservations: RS,
    bus: Arc<dyn EventBus>,
    low_stock_threshold: u32,
}

impl<IS, RS> ReservationEngine<IS, RS>
where
    IS: RecordStore<ProductId, InventoryRecord>,
    RS: RecordStore<ReservationKey, ReservationRecord>,
{
    /// Creates a new engine.
    ///
    /// `low_stock_threshold` is the level below which `inventory.low`
    /// events are published as a side effect of reserve/commit.
    pub fn new(
        records: IS,
        reservations: RS,
        bus: Arc<dyn EventBus>,
        low_stock_threshold: u32,
    ) -> Self {
        Self {
            records,
            reservations,
            bus,
            low_stock_threshold,
        }
    }

    /// Sets the physical stock level for a product, creating the counter
    /// record lazily on first write. Held reservations are preserved; a
    /// level below the currently held units is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(
        &self,
        tenant_id: &TenantId,
        product_id: &ProductId,
        stock: u32,
    ) -> Result<InventoryRecord> {
        for _ in 0..MAX_CAS_RETRIES {
            match self.records.get(tenant_id, product_id).await? {
                None => {
                    let record = InventoryRecord::new(
                        tenant_id.clone(),
                        product_id.clone(),
                        stock,
                    );
                    match self.records.insert(tenant_id, product_id, record.clone()).await {
                        Ok(_) => return Ok(record),
                        // Lost the creation race; loop and update instead.
                        Err(StoreError::AlreadyExists { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(existing) => {
                    if stock < existing.value.reserved {
                        return Err(InventoryError::StockBelowReserved {
                            product_id: product_id.clone(),
                            stock,
                            reserved: existing.value.reserved,
                        });
                    }
                    let mut updated = existing.value.clone();
                    updated.stock = stock;
                    match self
                        .records
                        .update(tenant_id, product_id, updated.clone(), existing.version)
                        .await
                    {
                        Ok(_) => return Ok(updated),
                        Err(StoreError::VersionConflict { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Err(InventoryError::Concurrency {
            product_id: product_id.clone(),
        })
    }

    /// Atomically holds `quantity` units of a product for an order.
    ///
    /// Idempotent on `(order, product)`: an existing reservation in any
    /// state is returned unchanged, so saga retries cannot double-reserve.
    /// Fails with `InsufficientStock` when `stock - reserved < quantity`.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        tenant_id: &TenantId,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<ReservationRecord> {
        let key: ReservationKey = (order_id, product_id.clone());

        for _ in 0..MAX_CAS_RETRIES {
            if let Some(existing) = self.reservations.get(tenant_id, &key).await? {
                return Ok(existing.value);
            }

            let Some(record) = self.records.get(tenant_id, product_id).await? else {
                // No stock was ever written for this product.
                metrics::counter!("inventory_reservations_rejected_total").increment(1);
                return Err(InventoryError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available: 0,
                });
            };

            let available = record.value.available();
            if available < quantity {
                metrics::counter!("inventory_reservations_rejected_total").increment(1);
                return Err(InventoryError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available,
                });
            }

            let mut updated = record.value.clone();
            updated.reserved += quantity;

            match self
                .records
                .update(tenant_id, product_id, updated.clone(), record.version)
                .await
            {
                Ok(_) => {
                    let reservation = ReservationRecord::held(
                        tenant_id.clone(),
                        order_id,
                        product_id.clone(),
                        quantity,
                    );
                    match self
                        .reservations
                        .insert(tenant_id, &key, reservation.clone())
                        .await
                    {
                        Ok(_) => {
                            metrics::counter!("inventory_reservations_total").increment(1);
                            self.maybe_publish_low(tenant_id, &record.value, &updated)
                                .await?;
                            return Ok(reservation);
                        }
                        Err(StoreError::AlreadyExists { .. }) => {
                            // A concurrent call for the same (order, product)
                            // slipped between our pre-check and the counter
                            // CAS. Its increment stands; undo ours.
                            self.unreserve_counter(tenant_id, product_id, quantity)
                                .await?;
                            let winner = self
                                .reservations
                                .get(tenant_id, &key)
                                .await?
                                .ok_or_else(|| InventoryError::ReservationNotFound {
                                    order_id,
                                    product_id: product_id.clone(),
                                })?;
                            return Ok(winner.value);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(StoreError::VersionConflict { .. }) => {
                    metrics::counter!("inventory_cas_conflicts_total").increment(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(InventoryError::Concurrency {
            product_id: product_id.clone(),
        })
    }

    /// Converts a held reservation into a physical stock decrement:
    /// `stock` and `reserved` both drop by the held quantity.
    ///
    /// Idempotent: a reservation already in a terminal state is returned
    /// as-is.
    #[tracing::instrument(skip(self))]
    pub async fn commit(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<ReservationRecord> {
        self.settle(tenant_id, order_id, product_id, ReservationState::Committed)
            .await
    }

    /// Returns a held reservation to available stock: `reserved` drops by
    /// the held quantity, `stock` is unchanged.
    ///
    /// Idempotent: a reservation already in a terminal state is returned
    /// as-is, so compensation retries cannot double-release.
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<ReservationRecord> {
        self.settle(tenant_id, order_id, product_id, ReservationState::Released)
            .await
    }

    /// Returns the counter record for a product, if stock was ever written.
    pub async fn get_record(
        &self,
        tenant_id: &TenantId,
        product_id: &ProductId,
    ) -> Result<Option<InventoryRecord>> {
        Ok(self
            .records
            .get(tenant_id, product_id)
            .await?
            .map(|r| r.value))
    }

    /// Returns the reservation for an order/product pair, if one exists.
    pub async fn get_reservation(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
    ) -> Result<Option<ReservationRecord>> {
        Ok(self
            .reservations
            .get(tenant_id, &(order_id, product_id.clone()))
            .await?
            .map(|r| r.value))
    }

    /// Moves a held reservation to a terminal state and adjusts the
    /// counters accordingly.
    async fn settle(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        product_id: &ProductId,
        target: ReservationState,
    ) -> Result<ReservationRecord> {
        let key: ReservationKey = (order_id, product_id.clone());

        let reservation = self
            .reservations
            .get(tenant_id, &key)
            .await?
            .ok_or_else(|| InventoryError::ReservationNotFound {
                order_id,
                product_id: product_id.clone(),
            })?;

        if reservation.value.state.is_terminal() {
            return Ok(reservation.value);
        }
        let quantity = reservation.value.quantity;

        // Flip the reservation first: its version CAS is the serialization
        // point for duplicate settle calls, so the counters move once.
        let mut settled = reservation.value.clone();
        settled.state = target;
        match self
            .reservations
            .update(tenant_id, &key, settled.clone(), reservation.version)
            .await
        {
            Ok(_) => {}
            Err(StoreError::VersionConflict { .. }) => {
                // A concurrent settle won; return whatever state it chose.
                let current = self
                    .reservations
                    .get(tenant_id, &key)
                    .await?
                    .ok_or_else(|| InventoryError::ReservationNotFound {
                        order_id,
                        product_id: product_id.clone(),
                    })?;
                return Ok(current.value);
            }
            Err(e) => return Err(e.into()),
        }

        for _ in 0..MAX_CAS_RETRIES {
            let record = self
                .records
                .get(tenant_id, product_id)
                .await?
                .ok_or_else(|| InventoryError::ReservationNotFound {
                    order_id,
                    product_id: product_id.clone(),
                })?;

            let mut updated = record.value.clone();
            updated.reserved = updated.reserved.saturating_sub(quantity);
            if target == ReservationState::Committed {
                updated.stock = updated.stock.saturating_sub(quantity);
            }

            match self
                .records
                .update(tenant_id, product_id, updated.clone(), record.version)
                .await
            {
                Ok(_) => {
                    if target == ReservationState::Committed {
                        self.maybe_publish_low(tenant_id, &record.value, &updated)
                            .await?;
                    }
                    return Ok(settled);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    metrics::counter!("inventory_cas_conflicts_total").increment(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(InventoryError::Concurrency {
            product_id: product_id.clone(),
        })
    }

    /// Undoes a counter increment after losing a duplicate-reservation race.
    async fn unreserve_counter(
        &self,
        tenant_id: &TenantId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        for _ in 0..MAX_CAS_RETRIES {
            let Some(record) = self.records.get(tenant_id, product_id).await? else {
                return Ok(());
            };
            let mut updated = record.value.clone();
            updated.reserved = updated.reserved.saturating_sub(quantity);
            match self
                .records
                .update(tenant_id, product_id, updated, record.version)
                .await
            {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(InventoryError::Concurrency {
            product_id: product_id.clone(),
        })
    }

    /// Publishes `inventory.low` when a write crosses the threshold:
    /// reserve shrinks availability, commit shrinks physical stock.
    async fn maybe_publish_low(
        &self,
        tenant_id: &TenantId,
        before: &InventoryRecord,
        after: &InventoryRecord,
    ) -> Result<()> {
        let threshold = self.low_stock_threshold;
        let crossed_available =
            before.available() >= threshold && after.available() < threshold;
        let crossed_stock = before.stock >= threshold && after.stock < threshold;
        if !crossed_available && !crossed_stock {
            return Ok(());
        }

        tracing::info!(
            %tenant_id,
            product_id = %after.product_id,
            stock = after.stock,
            reserved = after.reserved,
            threshold,
            "stock crossed low threshold"
        );
        let event = Event::builder()
            .tenant_id(tenant_id.clone())
            .event_type(topics::INVENTORY_LOW)
            .aggregate_key(Event::product_key(tenant_id, &after.product_id))
            .payload(&serde_json::json!({
                "product_id": after.product_id,
                "stock": after.stock,
                "reserved": after.reserved,
                "available": after.available(),
                "threshold": threshold,
            }))?
            .build();
        self.bus.publish(event).await?;
        Ok(())
    }
}
