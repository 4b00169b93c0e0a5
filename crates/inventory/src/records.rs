use serde::{Deserialize, Serialize};

use common::{OrderId, ProductId, TenantId};

/// Per-product stock counters for one tenant.
///
/// Invariant: `reserved <= stock` at all times. The record is created
/// lazily on the first stock write for a tenant/product pair and is
/// mutated exclusively through the reservation engine's compare-and-swap
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub tenant_id: TenantId,
    pub product_id: ProductId,

    /// Units physically on hand.
    pub stock: u32,

    /// Units held by active reservations.
    pub reserved: u32,
}

impl InventoryRecord {
    /// Creates a counter record with no reservations.
    pub fn new(tenant_id: TenantId, product_id: ProductId, stock: u32) -> Self {
        Self {
            tenant_id,
            product_id,
            stock,
            reserved: 0,
        }
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> u32 {
        self.stock - self.reserved
    }
}

/// Lifecycle of a reservation.
///
/// ```text
/// Held ──┬──► Committed   (payment succeeded, stock consumed)
///        └──► Released    (compensation, hold returned)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationState {
    /// Stock is held for the order, not yet consumed.
    Held,

    /// The hold was converted into a physical stock decrement (terminal).
    Committed,

    /// The hold was returned to available stock (terminal).
    Released,
}

impl ReservationState {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationState::Committed | ReservationState::Released)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Held => "Held",
            ReservationState::Committed => "Committed",
            ReservationState::Released => "Released",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage key for a reservation: one per line item per order.
pub type ReservationKey = (OrderId, ProductId);

/// A single order's hold on a single product.
///
/// Kept forever for audit and idempotent replay; saga retries after a
/// crash find the existing record instead of double-reserving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub state: ReservationState,
}

impl ReservationRecord {
    /// Creates a held reservation.
    pub fn held(
        tenant_id: TenantId,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> Self {
        Self {
            tenant_id,
            order_id,
            product_id,
            quantity,
            state: ReservationState::Held,
        }
    }

    /// The storage key for this reservation.
    pub fn key(&self) -> ReservationKey {
        (self.order_id, self.product_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_subtracts_reserved() {
        let mut record =
            InventoryRecord::new(TenantId::new("t1"), ProductId::new("SKU-1"), 10);
        assert_eq!(record.available(), 10);
        record.reserved = 4;
        assert_eq!(record.available(), 6);
    }

    #[test]
    fn terminal_states() {
        assert!(!ReservationState::Held.is_terminal());
        assert!(ReservationState::Committed.is_terminal());
        assert!(ReservationState::Released.is_terminal());
    }

    #[test]
    fn display() {
        assert_eq!(ReservationState::Held.to_string(), "Held");
        assert_eq!(ReservationState::Committed.to_string(), "Committed");
        assert_eq!(ReservationState::Released.to_string(), "Released");
    }

    #[test]
    fn reservation_serialization_roundtrip() {
        let reservation = ReservationRecord::held(
            TenantId::new("t1"),
            OrderId::new(),
            ProductId::new("SKU-1"),
            3,
        );
        let json = serde_json::to_string(&reservation).unwrap();
        let back: ReservationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reservation);
    }
}
