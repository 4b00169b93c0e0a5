//! Inventory reservation engine.
//!
//! Stock is held, committed, or released through single compare-and-swap
//! operations on the product's inventory counter, so concurrent orders for
//! the same product serialize on the record version while unrelated
//! products and tenants proceed independently. Reservations are never
//! deleted; their terminal state makes every operation idempotently
//! replayable.

pub mod engine;
pub mod error;
pub mod records;

pub use engine::ReservationEngine;
pub use error::{InventoryError, Result};
pub use records::{InventoryRecord, ReservationKey, ReservationRecord, ReservationState};
