//! Event-choreographed payment behind the synchronous gateway seam.
//!
//! Deployments that prefer full choreography publish `payment.requested`
//! and consume `payment.success` / `payment.failed` instead of calling the
//! payment collaborator directly. This gateway hides that exchange behind
//! the same `PaymentGateway` trait the coordinator already uses: `charge`
//! publishes the request and parks on a waiter until the outcome event for
//! the order arrives or the timeout elapses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use common::{OrderId, TenantId};
use domain::{Money, PaymentMethod};
use event_bus::{ConsumerError, Event, EventBus, EventConsumer, topics};

use super::payment::{ChargeOutcome, PaymentError, PaymentGateway};

#[derive(Debug)]
enum PaymentResolution {
    Success { transaction_id: String },
    Failed { reason: String },
}

type WaiterMap = Arc<Mutex<HashMap<OrderId, oneshot::Sender<PaymentResolution>>>>;

/// Payment gateway that speaks events instead of request/response.
pub struct EventDrivenPaymentGateway {
    bus: Arc<dyn EventBus>,
    waiters: WaiterMap,
    timeout: Duration,
}

impl EventDrivenPaymentGateway {
    /// Subscribes to payment outcome topics and returns the gateway.
    pub async fn connect(
        bus: Arc<dyn EventBus>,
        timeout: Duration,
    ) -> Result<Arc<Self>, event_bus::BusError> {
        let waiters: WaiterMap = Arc::new(Mutex::new(HashMap::new()));

        let consumer = Arc::new(OutcomeConsumer {
            waiters: Arc::clone(&waiters),
        });
        bus.subscribe(&[topics::PAYMENT_SUCCESS, topics::PAYMENT_FAILED], consumer)
            .await?;

        Ok(Arc::new(Self {
            bus,
            waiters,
            timeout,
        }))
    }
}

#[async_trait]
impl PaymentGateway for EventDrivenPaymentGateway {
    async fn charge(
        &self,
        tenant_id: &TenantId,
        order_id: OrderId,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<ChargeOutcome, PaymentError> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(order_id, tx);

        let request = Event::builder()
            .tenant_id(tenant_id.clone())
            .event_type(topics::PAYMENT_REQUESTED)
            .aggregate_key(Event::order_key(tenant_id, order_id))
            .payload(&serde_json::json!({
                "order_id": order_id,
                "amount_cents": amount.cents(),
                "payment_method": method,
            }))
            .map_err(|e| PaymentError::Internal(e.to_string()))?
            .build();

        if let Err(e) = self.bus.publish(request).await {
            self.waiters.lock().unwrap().remove(&order_id);
            return Err(PaymentError::Transient(e.to_string()));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(PaymentResolution::Success { transaction_id })) => {
                Ok(ChargeOutcome { transaction_id })
            }
            Ok(Ok(PaymentResolution::Failed { reason })) => Err(PaymentError::Declined(reason)),
            Ok(Err(_)) => Err(PaymentError::Transient(
                "payment resolution channel dropped".to_string(),
            )),
            Err(_) => {
                // Outcome may still arrive later; a retried charge registers
                // a fresh waiter for it.
                self.waiters.lock().unwrap().remove(&order_id);
                Err(PaymentError::Transient(
                    "timed out waiting for payment outcome".to_string(),
                ))
            }
        }
    }
}

/// Bus consumer resolving parked charges from payment outcome events.
struct OutcomeConsumer {
    waiters: WaiterMap,
}

#[async_trait]
impl EventConsumer for OutcomeConsumer {
    fn name(&self) -> &str {
        "payment_outcomes"
    }

    async fn handle(&self, event: &Event) -> Result<(), ConsumerError> {
        let order_id: OrderId = serde_json::from_value(event.payload["order_id"].clone())
            .map_err(|e| ConsumerError::Failed(format!("malformed payment outcome: {e}")))?;

        let Some(waiter) = self.waiters.lock().unwrap().remove(&order_id) else {
            // Duplicate delivery or an outcome nobody waits for anymore.
            return Ok(());
        };

        let resolution = match event.event_type.as_str() {
            topics::PAYMENT_SUCCESS => PaymentResolution::Success {
                transaction_id: event.payload["transaction_id"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => PaymentResolution::Failed {
                reason: event.payload["reason"]
                    .as_str()
                    .unwrap_or("payment failed")
                    .to_string(),
            },
        };

        // Receiver may have timed out in the meantime; nothing to do then.
        let _ = waiter.send(resolution);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryEventBus;

    /// Test stand-in for the external payment processor: answers every
    /// `payment.requested` with a success or failure outcome, linking the
    /// outcome to its cause.
    struct FakeProcessor {
        bus: Arc<InMemoryEventBus>,
        approve: bool,
    }

    #[async_trait]
    impl EventConsumer for FakeProcessor {
        fn name(&self) -> &str {
            "fake_processor"
        }

        async fn handle(&self, event: &Event) -> Result<(), ConsumerError> {
            let (event_type, payload) = if self.approve {
                (
                    topics::PAYMENT_SUCCESS,
                    serde_json::json!({
                        "order_id": event.payload["order_id"],
                        "transaction_id": "TXN-EVT-1",
                    }),
                )
            } else {
                (
                    topics::PAYMENT_FAILED,
                    serde_json::json!({
                        "order_id": event.payload["order_id"],
                        "reason": "card declined",
                    }),
                )
            };

            let outcome = Event::builder()
                .tenant_id(event.tenant_id.clone())
                .event_type(event_type)
                .aggregate_key(event.aggregate_key.clone())
                .causation_id(event.event_id)
                .payload_raw(payload)
                .build();
            self.bus
                .publish(outcome)
                .await
                .map_err(|e| ConsumerError::Failed(e.to_string()))?;
            Ok(())
        }
    }

    async fn setup(approve: bool) -> (Arc<InMemoryEventBus>, Arc<EventDrivenPaymentGateway>) {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.subscribe(
            &[topics::PAYMENT_REQUESTED],
            Arc::new(FakeProcessor {
                bus: bus.clone(),
                approve,
            }),
        )
        .await
        .unwrap();

        let gateway = EventDrivenPaymentGateway::connect(
            bus.clone() as Arc<dyn EventBus>,
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        (bus, gateway)
    }

    #[tokio::test]
    async fn charge_resolves_from_success_event() {
        let (_bus, gateway) = setup(true).await;

        let outcome = gateway
            .charge(
                &TenantId::new("t1"),
                OrderId::new(),
                Money::from_cents(100),
                &PaymentMethod::new("card-evt"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.transaction_id, "TXN-EVT-1");
    }

    #[tokio::test]
    async fn charge_resolves_from_failure_event() {
        let (_bus, gateway) = setup(false).await;

        let result = gateway
            .charge(
                &TenantId::new("t1"),
                OrderId::new(),
                Money::from_cents(100),
                &PaymentMethod::new("card-evt"),
            )
            .await;
        assert!(matches!(result, Err(PaymentError::Declined(reason)) if reason == "card declined"));
    }

    #[tokio::test]
    async fn charge_times_out_as_transient() {
        // No processor subscribed: the request goes unanswered.
        let bus = Arc::new(InMemoryEventBus::new());
        let gateway = EventDrivenPaymentGateway::connect(
            bus.clone() as Arc<dyn EventBus>,
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        let result = gateway
            .charge(
                &TenantId::new("t1"),
                OrderId::new(),
                Money::from_cents(100),
                &PaymentMethod::new("card-evt"),
            )
            .await;
        assert!(matches!(result, Err(PaymentError::Transient(_))));
    }
}
