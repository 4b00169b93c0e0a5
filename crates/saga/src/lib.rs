//! Order fulfillment saga.
//!
//! The coordinator drives an order through stock reservation, payment, and
//! shipping notification, mixing synchronous calls on the critical path
//! with asynchronous event fan-out for side effects. Every transition is a
//! conditional write on the order's version, so a crashed coordinator
//! resumes from persisted status instead of in-memory state. Failures
//! after stock was held are compensated by releasing the holds; a
//! compensation that exhausts its retries escalates the order to manual
//! intervention rather than leaving it ambiguous.

pub mod coordinator;
pub mod error;
pub mod retry;
pub mod services;

pub use coordinator::SagaCoordinator;
pub use error::SagaError;
pub use retry::{RetryPolicy, StepError};
pub use services::{
    ChargeOutcome, EventDrivenPaymentGateway, InMemoryPaymentGateway, InMemoryShippingService,
    InventoryCallError, InventoryClient, PaymentError, PaymentGateway, ShippingError,
    ShippingQuote, ShippingService,
};
