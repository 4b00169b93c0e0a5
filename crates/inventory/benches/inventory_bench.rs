use std::sync::Arc;

use common::{OrderId, ProductId, TenantId};
use criterion::{Criterion, criterion_group, criterion_main};
use event_bus::{EventBus, InMemoryEventBus};
use inventory::ReservationEngine;
use store::InMemoryStore;
use tokio::runtime::Runtime;

fn bench_reserve_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("reserve_release_cycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let bus = Arc::new(InMemoryEventBus::new());
                let engine = ReservationEngine::new(
                    InMemoryStore::new(),
                    InMemoryStore::new(),
                    bus as Arc<dyn EventBus>,
                    0,
                );
                let tenant = TenantId::new("bench");
                let product = ProductId::new("p1");
                engine.set_stock(&tenant, &product, 1_000).await.unwrap();

                for _ in 0..100 {
                    let order = OrderId::new();
                    engine.reserve(&tenant, &product, 1, order).await.unwrap();
                    engine.release(&tenant, order, &product).await.unwrap();
                }
            })
        })
    });
}

criterion_group!(benches, bench_reserve_release);
criterion_main!(benches);
