//! The order entity and its value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{OrderId, ProductId, TenantId, UserId};

use crate::error::OrderError;
use crate::money::Money;
use crate::status::OrderStatus;

/// One product position within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    /// Creates a line item.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// The line total (unit price times quantity).
    pub fn total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Opaque payment method token forwarded to the payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    /// Creates a payment method token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PaymentMethod {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Delivery address passed to the shipping collaborator for quoting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// An order owned by the saga coordinator.
///
/// Mutated only by the coordinator as the saga advances; once the status
/// is terminal the record is never written again. The concurrency version
/// lives in the store's `Versioned` wrapper. Payment method and shipping
/// address are persisted with the order so a resumed saga can re-derive
/// its external calls from storage alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub line_items: Vec<LineItem>,
    pub status: OrderStatus,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order in `Created` status after validating its line
    /// items: at least one item, positive quantities, non-negative prices.
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        line_items: Vec<LineItem>,
        payment_method: PaymentMethod,
        shipping_address: ShippingAddress,
    ) -> Result<Self, OrderError> {
        if line_items.is_empty() {
            return Err(OrderError::NoLineItems);
        }
        for item in &line_items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.clone(),
                });
            }
        }

        let total = line_items
            .iter()
            .fold(Money::zero(), |acc, item| acc.add(item.total()));
        let now = Utc::now();

        Ok(Self {
            tenant_id,
            order_id: OrderId::new(),
            user_id,
            line_items,
            status: OrderStatus::Created,
            total,
            payment_method,
            shipping_address,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns a copy advanced to `status` with a fresh update timestamp.
    ///
    /// Status legality is checked by the repository at write time.
    pub fn with_status(&self, status: OrderStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.updated_at = Utc::now();
        next
    }
}
