//! Publish/subscribe event bus with per-aggregate-key ordered delivery.
//!
//! The bus guarantees durable, at-least-once delivery per subscription.
//! Ordering is preserved only among events sharing the same aggregate key:
//! same-key events are routed to the same delivery lane and handled
//! sequentially, while different keys interleave freely. Consumers own
//! deduplication (see the `ledger` crate).

pub mod bus;
pub mod error;
pub mod event;
pub mod memory;

pub use bus::{ConsumerError, EventBus, EventConsumer};
pub use error::{BusError, Result};
pub use event::{Event, EventBuilder, topics};
pub use memory::InMemoryEventBus;
