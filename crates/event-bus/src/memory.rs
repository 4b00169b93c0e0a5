use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::{
    BusError, Event, Result,
    bus::{ConsumerError, EventBus, EventConsumer},
};

/// Number of delivery lanes per subscription.
///
/// Same-key events always hash to the same lane, so this bounds the
/// cross-key delivery parallelism of one subscription, not correctness.
const LANES_PER_SUBSCRIPTION: usize = 4;

/// Redeliveries attempted for a failed handler before dead-lettering.
const MAX_REDELIVERIES: u32 = 5;

/// Deferral retries before a delivery is dead-lettered. Deferral is for
/// unmet causation prerequisites; a prerequisite that never arrives within
/// the window is an upstream defect, not something to block the lane on
/// forever.
const MAX_DEFERRALS: u32 = 200;

const REDELIVERY_DELAY: Duration = Duration::from_millis(10);

struct Subscription {
    name: String,
    topics: HashSet<String>,
    lanes: Vec<mpsc::UnboundedSender<Event>>,
}

struct BusState {
    log: Vec<Event>,
    subscriptions: Vec<Subscription>,
}

/// In-memory event bus implementation.
///
/// Durability is an append-only in-process log: events survive for the
/// lifetime of the bus and are replayed to late subscribers. Each
/// subscription owns a fixed set of delivery lanes, each served by one
/// tokio task; an event is routed to `hash(aggregate_key) % lanes`, which
/// serializes same-key deliveries and lets different keys interleave.
#[derive(Clone)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
    in_flight: Arc<AtomicUsize>,
}

impl InMemoryEventBus {
    /// Creates a new bus with no subscriptions.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                log: Vec::new(),
                subscriptions: Vec::new(),
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of events in the durable log.
    pub async fn event_count(&self) -> usize {
        self.state.lock().await.log.len()
    }

    /// Returns a copy of the durable log, in publication order.
    pub async fn events(&self) -> Vec<Event> {
        self.state.lock().await.log.clone()
    }

    /// Waits until every enqueued delivery has been handled (or
    /// dead-lettered). Test support.
    pub async fn drain(&self) {
        while self.in_flight.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn lane_for(aggregate_key: &str, lane_count: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        aggregate_key.hash(&mut hasher);
        (hasher.finish() as usize) % lane_count
    }

    fn dispatch(subscription: &Subscription, event: &Event, in_flight: &Arc<AtomicUsize>) -> Result<()> {
        if !subscription.topics.contains(&event.event_type) {
            return Ok(());
        }
        let lane = Self::lane_for(&event.aggregate_key, subscription.lanes.len());
        in_flight.fetch_add(1, Ordering::AcqRel);
        subscription.lanes[lane].send(event.clone()).map_err(|_| {
            in_flight.fetch_sub(1, Ordering::AcqRel);
            BusError::LaneClosed(subscription.name.clone())
        })?;
        Ok(())
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_lane(
    mut rx: mpsc::UnboundedReceiver<Event>,
    consumer: Arc<dyn EventConsumer>,
    in_flight: Arc<AtomicUsize>,
) {
    while let Some(event) = rx.recv().await {
        let mut failures = 0u32;
        let mut deferrals = 0u32;
        loop {
            match consumer.handle(&event).await {
                Ok(()) => {
                    metrics::counter!("bus_events_delivered_total").increment(1);
                    break;
                }
                Err(ConsumerError::Defer(reason)) => {
                    deferrals += 1;
                    if deferrals >= MAX_DEFERRALS {
                        metrics::counter!("bus_dead_letters_total").increment(1);
                        tracing::error!(
                            consumer = consumer.name(),
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            %reason,
                            "delivery deferred past ceiling, dead-lettered"
                        );
                        break;
                    }
                    tracing::debug!(
                        consumer = consumer.name(),
                        event_id = %event.event_id,
                        %reason,
                        "delivery deferred, will retry"
                    );
                    tokio::time::sleep(REDELIVERY_DELAY).await;
                }
                Err(ConsumerError::Failed(reason)) => {
                    failures += 1;
                    if failures >= MAX_REDELIVERIES {
                        metrics::counter!("bus_dead_letters_total").increment(1);
                        tracing::error!(
                            consumer = consumer.name(),
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            %reason,
                            "delivery failed after redeliveries, dead-lettered"
                        );
                        break;
                    }
                    tracing::warn!(
                        consumer = consumer.name(),
                        event_id = %event.event_id,
                        attempt = failures,
                        %reason,
                        "delivery failed, redelivering"
                    );
                    tokio::time::sleep(REDELIVERY_DELAY).await;
                }
            }
        }
        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.push(event.clone());
        metrics::counter!("bus_events_published_total").increment(1);

        for subscription in &state.subscriptions {
            Self::dispatch(subscription, &event, &self.in_flight)?;
        }
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str], consumer: Arc<dyn EventConsumer>) -> Result<()> {
        // Holding the state lock across replay + registration closes the
        // window where a concurrent publish could be missed or doubled.
        let mut state = self.state.lock().await;

        let mut lanes = Vec::with_capacity(LANES_PER_SUBSCRIPTION);
        for _ in 0..LANES_PER_SUBSCRIPTION {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.push(tx);
            tokio::spawn(run_lane(
                rx,
                Arc::clone(&consumer),
                Arc::clone(&self.in_flight),
            ));
        }

        let subscription = Subscription {
            name: consumer.name().to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            lanes,
        };

        // Catch-up: replay the durable log before any live delivery.
        for event in &state.log {
            Self::dispatch(&subscription, event, &self.in_flight)?;
        }

        tracing::info!(
            consumer = %subscription.name,
            topics = ?topics,
            replayed = state.log.len(),
            "subscription registered"
        );
        state.subscriptions.push(subscription);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::topics;
    use common::TenantId;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicU32;

    struct Recording {
        name: String,
        seen: StdMutex<Vec<Event>>,
        fail_first: AtomicU32,
    }

    impl Recording {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: StdMutex::new(Vec::new()),
                fail_first: AtomicU32::new(0),
            })
        }

        fn failing_first(name: &str, failures: u32) -> Arc<Self> {
            let consumer = Self::new(name);
            consumer.fail_first.store(failures, Ordering::SeqCst);
            consumer
        }

        fn seen(&self) -> Vec<Event> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventConsumer for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, event: &Event) -> std::result::Result<(), ConsumerError> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(ConsumerError::Failed("induced".to_string()));
            }
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event(event_type: &str, key: &str, seq: u64) -> Event {
        Event::builder()
            .tenant_id(TenantId::new("t1"))
            .event_type(event_type)
            .aggregate_key(key)
            .payload_raw(serde_json::json!({ "seq": seq }))
            .build()
    }

    fn seq_of(event: &Event) -> u64 {
        event.payload["seq"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn delivers_to_matching_subscription() {
        let bus = InMemoryEventBus::new();
        let consumer = Recording::new("c1");
        bus.subscribe(&[topics::ORDER_CREATED], consumer.clone())
            .await
            .unwrap();

        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 1))
            .await
            .unwrap();
        bus.publish(event(topics::INVENTORY_LOW, "t1/product/p", 2))
            .await
            .unwrap();
        bus.drain().await;

        let seen = consumer.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type, topics::ORDER_CREATED);
    }

    #[tokio::test]
    async fn late_subscriber_catches_up_from_log() {
        let bus = InMemoryEventBus::new();
        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 1))
            .await
            .unwrap();
        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 2))
            .await
            .unwrap();

        let consumer = Recording::new("late");
        bus.subscribe(&[topics::ORDER_CREATED], consumer.clone())
            .await
            .unwrap();
        bus.drain().await;

        let seen = consumer.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seq_of(&seen[0]), 1);
        assert_eq!(seq_of(&seen[1]), 2);
    }

    #[tokio::test]
    async fn same_key_events_are_delivered_in_order() {
        let bus = InMemoryEventBus::new();
        let consumer = Recording::new("ordered");
        bus.subscribe(&[topics::ORDER_CREATED], consumer.clone())
            .await
            .unwrap();

        // Interleave publications across two keys
        for seq in 0..50u64 {
            let key = if seq % 2 == 0 { "t1/order/a" } else { "t1/order/b" };
            bus.publish(event(topics::ORDER_CREATED, key, seq)).await.unwrap();
        }
        bus.drain().await;

        let seen = consumer.seen();
        assert_eq!(seen.len(), 50);
        for key in ["t1/order/a", "t1/order/b"] {
            let seqs: Vec<u64> = seen
                .iter()
                .filter(|e| e.aggregate_key == key)
                .map(seq_of)
                .collect();
            let mut sorted = seqs.clone();
            sorted.sort_unstable();
            assert_eq!(seqs, sorted, "out-of-order delivery for {key}");
        }
    }

    #[tokio::test]
    async fn failed_delivery_is_retried() {
        let bus = InMemoryEventBus::new();
        let consumer = Recording::failing_first("flaky", 2);
        bus.subscribe(&[topics::ORDER_CREATED], consumer.clone())
            .await
            .unwrap();

        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 7))
            .await
            .unwrap();
        bus.drain().await;

        // Two induced failures, then the redelivery lands.
        let seen = consumer.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seq_of(&seen[0]), 7);
    }

    #[tokio::test]
    async fn exhausted_redeliveries_dead_letter_without_blocking_lane() {
        let bus = InMemoryEventBus::new();
        // Exactly enough induced failures to exhaust the first delivery.
        let consumer = Recording::failing_first("broken", MAX_REDELIVERIES);
        bus.subscribe(&[topics::ORDER_CREATED], consumer.clone())
            .await
            .unwrap();

        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 1))
            .await
            .unwrap();
        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 2))
            .await
            .unwrap();
        bus.drain().await;

        // First event consumed all induced failures and was dropped; the
        // second was delivered behind it.
        let seen = consumer.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seq_of(&seen[0]), 2);
    }

    struct DeferOnce {
        inner: Arc<Recording>,
        deferred: AtomicU32,
    }

    #[async_trait]
    impl EventConsumer for DeferOnce {
        fn name(&self) -> &str {
            "defer-once"
        }

        async fn handle(&self, event: &Event) -> std::result::Result<(), ConsumerError> {
            if self.deferred.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ConsumerError::Defer("prerequisite missing".to_string()));
            }
            self.inner.handle(event).await
        }
    }

    #[tokio::test]
    async fn deferred_delivery_is_eventually_applied() {
        let bus = InMemoryEventBus::new();
        let recording = Recording::new("inner");
        let consumer = Arc::new(DeferOnce {
            inner: recording.clone(),
            deferred: AtomicU32::new(0),
        });
        bus.subscribe(&[topics::ORDER_CREATED], consumer).await.unwrap();

        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 3))
            .await
            .unwrap();
        bus.drain().await;

        let seen = recording.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seq_of(&seen[0]), 3);
    }

    #[tokio::test]
    async fn fan_out_reaches_every_subscription() {
        let bus = InMemoryEventBus::new();
        let c1 = Recording::new("c1");
        let c2 = Recording::new("c2");
        bus.subscribe(&[topics::ORDER_CREATED], c1.clone()).await.unwrap();
        bus.subscribe(&[topics::ORDER_CREATED, topics::ORDER_CANCELLED], c2.clone())
            .await
            .unwrap();

        bus.publish(event(topics::ORDER_CREATED, "t1/order/a", 1))
            .await
            .unwrap();
        bus.publish(event(topics::ORDER_CANCELLED, "t1/order/a", 2))
            .await
            .unwrap();
        bus.drain().await;

        assert_eq!(c1.seen().len(), 1);
        assert_eq!(c2.seen().len(), 2);
        assert_eq!(bus.event_count().await, 2);
    }
}
