//! Saga coordinator driving orders to a terminal status.

use std::sync::Arc;

use common::{OrderId, TenantId, UserId};
use domain::{
    DomainError, LineItem, Order, OrderRepository, OrderStatus, PaymentMethod, ShippingAddress,
};
use event_bus::{Event, EventBus, topics};
use store::{RecordStore, StoreError, Versioned};

use crate::error::{Result, SagaError};
use crate::retry::RetryPolicy;
use crate::services::inventory::{InventoryCallError, InventoryClient};
use crate::services::payment::{PaymentError, PaymentGateway};
use crate::services::shipping::ShippingService;

/// How a saga step failed, which decides the next transition.
enum StepFailure {
    /// Business rejection or exhausted transient retries: take the failure
    /// branch of the transition table.
    Reject(SagaError),

    /// Compensation or commit could not be completed: park the order in
    /// `FailedManual` and alert an operator.
    Escalate(SagaError),

    /// Unknown infrastructure trouble: leave the order where it is; the
    /// recovery scan resumes it later.
    Abort(SagaError),
}

/// Orchestrates the order fulfillment saga.
///
/// The critical path (reserve, charge, commit/release) is synchronous
/// request/response with retry; side effects fan out as events. Every
/// transition is a compare-and-swap on the order's version, so the machine
/// is resumable: `resume` and `recover` re-derive the next entry action
/// from the persisted status after a crash.
pub struct SagaCoordinator<OS, I, P, Sh>
where
    OS: RecordStore<OrderId, Order>,
    I: InventoryClient,
    P: PaymentGateway,
    Sh: ShippingService,
{
    orders: OrderRepository<OS>,
    inventory: I,
    payment: P,
    shipping: Sh,
    bus: Arc<dyn EventBus>,
    retry: RetryPolicy,
}

impl<OS, I, P, Sh> SagaCoordinator<OS, I, P, Sh>
where
    OS: RecordStore<OrderId, Order>,
    I: InventoryClient,
    P: PaymentGateway,
    Sh: ShippingService,
{
    /// Creates a new coordinator.
    pub fn new(
        order_store: OS,
        inventory: I,
        payment: P,
        shipping: Sh,
        bus: Arc<dyn EventBus>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            orders: OrderRepository::new(order_store),
            inventory,
            payment,
            shipping,
            bus,
            retry,
        }
    }

    /// Returns the order repository backing this coordinator.
    pub fn orders(&self) -> &OrderRepository<OS> {
        &self.orders
    }

    /// Creates an order and drives it to a terminal status.
    ///
    /// Business rejections (insufficient stock, declined payment) surface
    /// as errors after compensation has completed; the order itself ends
    /// `Cancelled`. Validation failures reject before anything persists.
    #[tracing::instrument(skip(self, line_items, payment_method, shipping_address))]
    pub async fn create_order(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        line_items: Vec<LineItem>,
        payment_method: PaymentMethod,
        shipping_address: ShippingAddress,
    ) -> Result<OrderId> {
        let order = Order::new(
            tenant_id,
            user_id,
            line_items,
            payment_method,
            shipping_address,
        )?;
        let order_id = order.order_id;
        let version = self.orders.create(&order).await?;

        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        let (terminal, rejection) = self.drive(Versioned::new(order, version)).await?;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        tracing::info!(
            %order_id,
            status = %terminal.value.status,
            duration,
            "saga reached terminal status"
        );

        match rejection {
            Some(e) => Err(e),
            None => Ok(order_id),
        }
    }

    /// Resumes an interrupted saga from its persisted status.
    ///
    /// Returns the terminal status the order reached. A terminal order is
    /// returned as-is; rejections that already compensated are not
    /// re-raised.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, tenant_id: &TenantId, order_id: OrderId) -> Result<OrderStatus> {
        let current = self.orders.get_required(tenant_id, order_id).await?;
        if current.value.status.is_terminal() {
            return Ok(current.value.status);
        }

        metrics::counter!("saga_resumes_total").increment(1);
        let (terminal, _rejection) = self.drive(current).await?;
        Ok(terminal.value.status)
    }

    /// Scans a tenant for orders stuck in a non-terminal status and
    /// resumes each. Run on startup after a crash.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self, tenant_id: &TenantId) -> Result<Vec<(OrderId, OrderStatus)>> {
        let unfinished = self.orders.find_unfinished(tenant_id).await?;
        tracing::info!(%tenant_id, count = unfinished.len(), "recovering unfinished orders");

        let mut outcomes = Vec::with_capacity(unfinished.len());
        for record in unfinished {
            let order_id = record.value.order_id;
            let status = self.resume(tenant_id, order_id).await?;
            outcomes.push((order_id, status));
        }
        Ok(outcomes)
    }

    /// Runs the state machine from the order's current status until a
    /// terminal status is reached, returning the terminal record and the
    /// rejection that routed it there, if any.
    async fn drive(
        &self,
        mut current: Versioned<Order>,
    ) -> Result<(Versioned<Order>, Option<SagaError>)> {
        let mut rejection: Option<SagaError> = None;

        loop {
            match current.value.status {
                OrderStatus::Created => {
                    current = self.advance(current, OrderStatus::StockReserving).await?.0;
                }

                OrderStatus::StockReserving => match self.reserve_all(&current.value).await {
                    Ok(()) => {
                        current = self.advance(current, OrderStatus::StockReserved).await?.0;
                    }
                    Err(StepFailure::Reject(e)) => {
                        let (next, moved) =
                            self.advance(current, OrderStatus::Cancelled).await?;
                        if moved {
                            self.publish_order_cancelled(&next.value, &e).await?;
                        }
                        rejection = Some(e);
                        current = next;
                    }
                    Err(StepFailure::Escalate(e)) => {
                        current = self.escalate(current, &e).await?;
                        rejection = Some(e);
                    }
                    Err(StepFailure::Abort(e)) => return Err(e),
                },

                OrderStatus::StockReserved => match self.charge(&current.value).await {
                    Ok(transaction_id) => {
                        tracing::info!(
                            order_id = %current.value.order_id,
                            %transaction_id,
                            "payment captured"
                        );
                        current = self.advance(current, OrderStatus::Paid).await?.0;
                    }
                    Err(StepFailure::Reject(e)) => {
                        rejection = Some(e);
                        current = self
                            .advance(current, OrderStatus::CompensatingStock)
                            .await?
                            .0;
                    }
                    Err(StepFailure::Escalate(e)) => {
                        current = self.escalate(current, &e).await?;
                        rejection = Some(e);
                    }
                    Err(StepFailure::Abort(e)) => return Err(e),
                },

                OrderStatus::CompensatingStock => {
                    match self.release_all(&current.value).await {
                        Ok(()) => {
                            let (next, moved) =
                                self.advance(current, OrderStatus::Cancelled).await?;
                            if moved {
                                let reason = rejection
                                    .as_ref()
                                    .map(|e| e.to_string())
                                    .unwrap_or_else(|| "payment failed".to_string());
                                self.publish_cancelled_with_reason(&next.value, &reason)
                                    .await?;
                            }
                            current = next;
                        }
                        Err(e) => {
                            let failure = SagaError::CompensationFailure {
                                order_id: current.value.order_id,
                                reason: e.to_string(),
                            };
                            current = self.escalate(current, &failure).await?;
                            rejection = Some(failure);
                        }
                    }
                }

                OrderStatus::Paid => match self.finish_paid_order(&current.value).await {
                    Ok(()) => {
                        current = self.advance(current, OrderStatus::Completed).await?.0;
                        metrics::counter!("saga_completed").increment(1);
                    }
                    Err(StepFailure::Escalate(e) | StepFailure::Reject(e)) => {
                        current = self.escalate(current, &e).await?;
                        rejection = Some(e);
                    }
                    Err(StepFailure::Abort(e)) => return Err(e),
                },

                OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::FailedManual => {
                    return Ok((current, rejection));
                }
            }
        }
    }

    /// Performs one guarded transition. On a version conflict another
    /// instance advanced the order first; the reloaded record is returned
    /// with `false` and the caller re-derives its action from it.
    async fn advance(
        &self,
        current: Versioned<Order>,
        next: OrderStatus,
    ) -> Result<(Versioned<Order>, bool)> {
        match self.orders.transition(&current.value, next, current.version).await {
            Ok(updated) => Ok((updated, true)),
            Err(DomainError::Store(StoreError::VersionConflict { .. })) => {
                metrics::counter!("saga_transition_conflicts_total").increment(1);
                tracing::warn!(
                    order_id = %current.value.order_id,
                    from = %current.value.status,
                    to = %next,
                    "lost transition race, reloading order"
                );
                let reloaded = self
                    .orders
                    .get_required(&current.value.tenant_id, current.value.order_id)
                    .await?;
                Ok((reloaded, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the order to `FailedManual` and alerts operators. The only
    /// outcome the system cannot resolve on its own.
    async fn escalate(
        &self,
        current: Versioned<Order>,
        cause: &SagaError,
    ) -> Result<Versioned<Order>> {
        metrics::counter!("saga_failed_manual_total").increment(1);
        tracing::error!(
            order_id = %current.value.order_id,
            error = %cause,
            "saga requires operator intervention"
        );
        let (next, moved) = self.advance(current, OrderStatus::FailedManual).await?;
        if moved {
            self.publish_needs_intervention(&next.value, cause).await?;
        }
        Ok(next)
    }

    /// Reserves every line item, all-or-nothing: on any failure, holds
    /// taken so far are released before the error is reported.
    async fn reserve_all(&self, order: &Order) -> std::result::Result<(), StepFailure> {
        let mut held: Vec<&LineItem> = Vec::new();

        for item in &order.line_items {
            let result = self
                .retry
                .run("reserve_stock", || {
                    self.inventory.reserve(
                        &order.tenant_id,
                        &item.product_id,
                        item.quantity,
                        order.order_id,
                    )
                })
                .await;

            match result {
                Ok(_) => held.push(item),
                Err(e) => {
                    let failure = match e {
                        InventoryCallError::InsufficientStock {
                            product_id,
                            requested,
                            available,
                        } => StepFailure::Reject(SagaError::InsufficientStock {
                            product_id,
                            requested,
                            available,
                        }),
                        InventoryCallError::Transient(reason) => {
                            StepFailure::Reject(SagaError::TransientDependency {
                                step: "reserve_stock".to_string(),
                                reason,
                            })
                        }
                        other => StepFailure::Abort(SagaError::TransientDependency {
                            step: "reserve_stock".to_string(),
                            reason: other.to_string(),
                        }),
                    };

                    // Return earlier holds before reporting the failure.
                    for held_item in held {
                        if let Err(release_err) = self.release_item(order, held_item).await {
                            return Err(StepFailure::Escalate(
                                SagaError::CompensationFailure {
                                    order_id: order.order_id,
                                    reason: release_err.to_string(),
                                },
                            ));
                        }
                    }
                    return Err(failure);
                }
            }
        }
        Ok(())
    }

    /// Charges the order total, classifying the failure for the table.
    async fn charge(&self, order: &Order) -> std::result::Result<String, StepFailure> {
        let result = self
            .retry
            .run("charge_payment", || {
                self.payment.charge(
                    &order.tenant_id,
                    order.order_id,
                    order.total,
                    &order.payment_method,
                )
            })
            .await;

        match result {
            Ok(outcome) => Ok(outcome.transaction_id),
            Err(PaymentError::Declined(reason)) => {
                Err(StepFailure::Reject(SagaError::PaymentDeclined(reason)))
            }
            Err(PaymentError::Transient(reason)) => {
                Err(StepFailure::Reject(SagaError::TransientDependency {
                    step: "charge_payment".to_string(),
                    reason,
                }))
            }
            // The charge may or may not have landed; the idempotent retry
            // on resume settles it rather than compensating blind.
            Err(PaymentError::Internal(reason)) => {
                Err(StepFailure::Abort(SagaError::TransientDependency {
                    step: "charge_payment".to_string(),
                    reason,
                }))
            }
        }
    }

    /// Releases every hold the order has. Line items that were never held
    /// are skipped; compensation is always forward-moving.
    async fn release_all(&self, order: &Order) -> std::result::Result<(), SagaError> {
        for item in &order.line_items {
            self.release_item(order, item).await?;
        }
        Ok(())
    }

    async fn release_item(
        &self,
        order: &Order,
        item: &LineItem,
    ) -> std::result::Result<(), SagaError> {
        let result = self
            .retry
            .run("release_stock", || {
                self.inventory
                    .release(&order.tenant_id, order.order_id, &item.product_id)
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            // Never held: nothing to release.
            Err(InventoryCallError::NotFound { .. }) => Ok(()),
            Err(e) => Err(SagaError::TransientDependency {
                step: "release_stock".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Entry actions of `Paid`: commit every hold, publish the fan-out
    /// event, request a shipping quote best-effort.
    async fn finish_paid_order(&self, order: &Order) -> std::result::Result<(), StepFailure> {
        for item in &order.line_items {
            let result = self
                .retry
                .run("commit_stock", || {
                    self.inventory
                        .commit(&order.tenant_id, order.order_id, &item.product_id)
                })
                .await;

            if let Err(e) = result {
                // Stock was paid for but cannot be committed; hand the
                // order to an operator instead of guessing.
                return Err(StepFailure::Escalate(SagaError::CompensationFailure {
                    order_id: order.order_id,
                    reason: format!("commit after payment failed: {e}"),
                }));
            }
        }

        self.publish_order_created(order)
            .await
            .map_err(StepFailure::Abort)?;

        // Best-effort: a failed quote is logged and retried out-of-band.
        match self
            .shipping
            .quote(&order.tenant_id, order.order_id, &order.shipping_address)
            .await
        {
            Ok(quote) => {
                tracing::info!(
                    order_id = %order.order_id,
                    provider = %quote.provider,
                    cost = %quote.cost,
                    "shipping quote obtained"
                );
            }
            Err(e) => {
                metrics::counter!("saga_shipping_quote_failures_total").increment(1);
                tracing::warn!(
                    order_id = %order.order_id,
                    error = %e,
                    "shipping quote failed, continuing"
                );
            }
        }

        Ok(())
    }

    async fn publish_order_created(&self, order: &Order) -> Result<()> {
        let event = Event::builder()
            .tenant_id(order.tenant_id.clone())
            .event_type(topics::ORDER_CREATED)
            .aggregate_key(Event::order_key(&order.tenant_id, order.order_id))
            .payload(&serde_json::json!({
                "order_id": order.order_id,
                "user_id": order.user_id,
                "total_cents": order.total.cents(),
                "line_items": order.line_items,
            }))?
            .build();
        self.bus.publish(event).await?;
        Ok(())
    }

    async fn publish_order_cancelled(&self, order: &Order, cause: &SagaError) -> Result<()> {
        self.publish_cancelled_with_reason(order, &cause.to_string())
            .await
    }

    async fn publish_cancelled_with_reason(&self, order: &Order, reason: &str) -> Result<()> {
        let event = Event::builder()
            .tenant_id(order.tenant_id.clone())
            .event_type(topics::ORDER_CANCELLED)
            .aggregate_key(Event::order_key(&order.tenant_id, order.order_id))
            .payload(&serde_json::json!({
                "order_id": order.order_id,
                "user_id": order.user_id,
                "reason": reason,
            }))?
            .build();
        self.bus.publish(event).await?;
        Ok(())
    }

    async fn publish_needs_intervention(&self, order: &Order, cause: &SagaError) -> Result<()> {
        let event = Event::builder()
            .tenant_id(order.tenant_id.clone())
            .event_type(topics::ORDER_NEEDS_INTERVENTION)
            .aggregate_key(Event::order_key(&order.tenant_id, order.order_id))
            .payload(&serde_json::json!({
                "order_id": order.order_id,
                "status": order.status,
                "reason": cause.to_string(),
            }))?
            .build();
        self.bus.publish(event).await?;
        Ok(())
    }
}
