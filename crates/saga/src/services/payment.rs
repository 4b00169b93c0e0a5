//! Payment gateway seam and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use common::{OrderId, TenantId};
use domain::{Money, PaymentMethod};

use crate::retry::StepError;

/// Result of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeOutcome {
    /// The transaction ID assigned by the payment collaborator.
    pub transaction_id: String,
}

/// Errors surfaced by payment calls, classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The card was declined; fails the step immediately.
    #[error("payment declined: {0}")]
    Declined(String),

    /// Timeout or connection failure; eligible for retry.
    #[error("transient payment failure: {0}")]
    Transient(String),

    /// Anything else; not retried.
    #[error("payment call failed: {0}")]
    Internal(String),
}

impl StepError for PaymentError {
    fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Transient(_))
    }
}

/// Synchronous charge operation on the payment collaborator.
///
/// `order_id` doubles as the idempotency key: charging the same order
/// twice must return the original transaction instead of charging again,
/// so a resumed saga cannot double-charge.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the given amount for an order.
    async fn charge(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<ChargeOutcome, PaymentError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn charge(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<ChargeOutcome, PaymentError> {
        (**self).charge(tenant_id, order_id, amount, method).await
    }
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    transactions: HashMap<(TenantId, OrderId), String>,
    next_id: u32,
    decline_with: Option<String>,
    transient_failures: u32,
    charge_calls: u32,
}

/// In-memory payment gateway for testing.
///
/// Idempotent per (tenant, order); configurable to decline or to fail
/// transiently for the next N calls.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline every charge with the reason.
    pub fn set_decline(&self, reason: Option<&str>) {
        self.state.write().unwrap().decline_with = reason.map(|r| r.to_string());
    }

    /// Configures the next `count` charge calls to fail transiently.
    pub fn set_transient_failures(&self, count: u32) {
        self.state.write().unwrap().transient_failures = count;
    }

    /// Returns the number of captured transactions.
    pub fn transaction_count(&self) -> usize {
        self.state.read().unwrap().transactions.len()
    }

    /// Returns the total number of charge calls made.
    pub fn charge_calls(&self) -> u32 {
        self.state.read().unwrap().charge_calls
    }

    /// Returns the transaction for an order, if one was captured.
    pub fn transaction_for(&self, tenant_id: &TenantId, order_id: OrderId) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .transactions
            .get(&(tenant_id.clone(), order_id))
            .cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        _amount: Money,
        _method: &PaymentMethod,
    ) -> Result<ChargeOutcome, PaymentError> {
        let mut state = self.state.write().unwrap();
        state.charge_calls += 1;

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(PaymentError::Transient("connection reset".to_string()));
        }

        if let Some(reason) = &state.decline_with {
            return Err(PaymentError::Declined(reason.clone()));
        }

        let key = (tenant_id.clone(), order_id);
        if let Some(existing) = state.transactions.get(&key) {
            return Ok(ChargeOutcome {
                transaction_id: existing.clone(),
            });
        }

        state.next_id += 1;
        let transaction_id = format!("TXN-{:04}", state.next_id);
        state.transactions.insert(key, transaction_id.clone());

        Ok(ChargeOutcome { transaction_id })
    }
}
