//! Shipping quote seam and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use common::{OrderId, TenantId};
use domain::{Money, ShippingAddress};

use crate::retry::StepError;

/// A delivery quote from the shipping collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingQuote {
    pub cost: Money,
    pub provider: String,
}

/// Errors surfaced by shipping calls.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    /// Timeout or connection failure.
    #[error("transient shipping failure: {0}")]
    Transient(String),

    /// The collaborator refused the request.
    #[error("shipping unavailable: {0}")]
    Unavailable(String),
}

impl StepError for ShippingError {
    fn is_transient(&self) -> bool {
        matches!(self, ShippingError::Transient(_))
    }
}

/// Best-effort shipping quote for a paid order. A failure here never
/// fails the order; it is logged and retried out-of-band.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Requests a delivery quote for an order.
    async fn quote(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        address: &ShippingAddress,
    ) -> Result<ShippingQuote, ShippingError>;
}

#[async_trait]
impl<T: ShippingService + ?Sized> ShippingService for Arc<T> {
    async fn quote(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        address: &ShippingAddress,
    ) -> Result<ShippingQuote, ShippingError> {
        (**self).quote(tenant_id, order_id, address).await
    }
}

#[derive(Debug, Default)]
struct InMemoryShippingState {
    quotes: Vec<(TenantId, OrderId)>,
    fail_on_quote: bool,
}

/// In-memory shipping service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<InMemoryShippingState>>,
}

impl InMemoryShippingService {
    /// Creates a new in-memory shipping service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail quote calls.
    pub fn set_fail_on_quote(&self, fail: bool) {
        self.state.write().unwrap().fail_on_quote = fail;
    }

    /// Returns the number of quotes issued.
    pub fn quote_count(&self) -> usize {
        self.state.read().unwrap().quotes.len()
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn quote(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        _address: &ShippingAddress,
    ) -> Result<ShippingQuote, ShippingError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_quote {
            return Err(ShippingError::Unavailable(
                "carrier API down".to_string(),
            ));
        }

        state.quotes.push((tenant_id.clone(), order_id));
        Ok(ShippingQuote {
            cost: Money::from_cents(799),
            provider: "parcelworks".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            line1: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country: "US".to_string(),
        }
    }

    #[tokio::test]
    async fn quote_records_request() {
        let service = InMemoryShippingService::new();
        let quote = service
            .quote(&TenantId::new("t1"), OrderId::new(), &address())
            .await
            .unwrap();
        assert_eq!(quote.provider, "parcelworks");
        assert_eq!(service.quote_count(), 1);
    }

    #[tokio::test]
    async fn failing_quote_reports_unavailable() {
        let service = InMemoryShippingService::new();
        service.set_fail_on_quote(true);

        let result = service
            .quote(&TenantId::new("t1"), OrderId::new(), &address())
            .await;
        assert!(matches!(result, Err(ShippingError::Unavailable(_))));
        assert_eq!(service.quote_count(), 0);
    }
}
