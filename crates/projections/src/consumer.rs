//! Ledger-guarded bus consumer.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{ConsumerError, Event, EventConsumer};
use ledger::{ApplyLedger, ApplyOutcome};

use crate::projection::Projection;

/// Wraps a projection with the idempotent apply ledger.
///
/// The ledger row is written immediately before the projection's own
/// mutation; if the mutation fails, the row is revoked so the bus's
/// redelivery can retry cleanly. A duplicate delivery is acknowledged
/// without touching the projection.
pub struct LedgeredConsumer<P> {
    projection: P,
    ledger: Arc<dyn ApplyLedger>,
}

impl<P: Projection> LedgeredConsumer<P> {
    /// Creates a guarded consumer.
    pub fn new(projection: P, ledger: Arc<dyn ApplyLedger>) -> Self {
        Self { projection, ledger }
    }
}

#[async_trait]
impl<P: Projection> EventConsumer for LedgeredConsumer<P> {
    fn name(&self) -> &str {
        self.projection.name()
    }

    async fn handle(&self, event: &Event) -> Result<(), ConsumerError> {
        let outcome = self
            .ledger
            .try_apply(self.projection.name(), event)
            .await
            .map_err(|e| ConsumerError::Failed(e.to_string()))?;

        if outcome == ApplyOutcome::AlreadyApplied {
            metrics::counter!("projections_duplicates_skipped_total").increment(1);
            tracing::debug!(
                consumer = self.projection.name(),
                event_id = %event.event_id,
                "duplicate delivery skipped"
            );
            return Ok(());
        }

        match self.projection.apply(event).await {
            Ok(()) => {
                metrics::counter!("projections_events_applied_total").increment(1);
                Ok(())
            }
            Err(e) => {
                // Compensating cleanup: without this, a redelivery would
                // be skipped even though the mutation never happened.
                if let Err(revoke_err) = self
                    .ledger
                    .revoke(self.projection.name(), event.event_id)
                    .await
                {
                    tracing::error!(
                        consumer = self.projection.name(),
                        event_id = %event.event_id,
                        error = %revoke_err,
                        "failed to revoke ledger entry after apply failure"
                    );
                }
                Err(ConsumerError::Failed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use common::TenantId;
    use event_bus::topics;
    use ledger::InMemoryApplyLedger;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        applied: Mutex<Vec<Event>>,
        fail_first: AtomicU32,
    }

    #[async_trait]
    impl Projection for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn apply(&self, event: &Event) -> Result<()> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(crate::ProjectionError::Projection("induced".to_string()));
            }
            self.applied.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event() -> Event {
        Event::builder()
            .tenant_id(TenantId::new("t1"))
            .event_type(topics::ORDER_CREATED)
            .aggregate_key("t1/order/a")
            .payload_raw(serde_json::json!({}))
            .build()
    }

    #[tokio::test]
    async fn duplicate_delivery_is_skipped() {
        let ledger = Arc::new(InMemoryApplyLedger::new());
        let projection = Arc::new(Counting {
            applied: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(0),
        });
        let consumer = LedgeredConsumer::new(projection.clone(), ledger.clone() as _);

        let e = event();
        consumer.handle(&e).await.unwrap();
        consumer.handle(&e).await.unwrap();

        assert_eq!(projection.applied.lock().unwrap().len(), 1);
        assert_eq!(ledger.record_count(), 1);
    }

    #[tokio::test]
    async fn apply_failure_revokes_the_ledger_entry() {
        let ledger = Arc::new(InMemoryApplyLedger::new());
        let projection = Arc::new(Counting {
            applied: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(1),
        });
        let consumer = LedgeredConsumer::new(projection.clone(), ledger.clone() as _);

        let e = event();
        assert!(consumer.handle(&e).await.is_err());
        // The failed apply left no ledger row, so the redelivery lands.
        assert_eq!(ledger.record_count(), 0);

        consumer.handle(&e).await.unwrap();
        assert_eq!(projection.applied.lock().unwrap().len(), 1);
        assert_eq!(ledger.record_count(), 1);
    }
}
