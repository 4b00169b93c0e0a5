//! Idempotent apply ledger.
//!
//! Records which events each consumer has already applied, turning the
//! bus's at-least-once delivery into exactly-once effect: the presence of a
//! `ConsumerApplyRecord` for a `(consumer, event)` pair is the sole
//! idempotency guard, written once and never updated.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::EventId;
use event_bus::Event;

pub use memory::InMemoryApplyLedger;

/// One row per (consumer, event) pair; inserted once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerApplyRecord {
    /// The consumer that applied the event.
    pub consumer_name: String,

    /// The event that was applied.
    pub event_id: EventId,

    /// When the record was written.
    pub applied_at: DateTime<Utc>,

    /// Digest of the consumer's observable result, for audit.
    pub result_digest: String,
}

/// Outcome of a `try_apply` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record was inserted; the caller must now run its side effects.
    FirstApplication,

    /// A record already exists; the caller must skip its side effects.
    AlreadyApplied,
}

impl ApplyOutcome {
    /// Returns true if the event was seen before.
    pub fn already_applied(&self) -> bool {
        matches!(self, ApplyOutcome::AlreadyApplied)
    }
}

/// Errors that can occur when interacting with the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A serialization error occurred while computing a digest.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// The idempotency guard every event consumer wraps itself with.
///
/// `try_apply` is written immediately before the consumer's own mutation;
/// if the mutation then fails, `revoke` removes the record so redelivery
/// can retry cleanly. A consumer whose store can write both atomically may
/// do so instead and skip `revoke`.
#[async_trait]
pub trait ApplyLedger: Send + Sync {
    /// Atomically records the (consumer, event) pair.
    ///
    /// Returns `AlreadyApplied` when a record exists, in which case the
    /// caller must not re-execute side effects.
    async fn try_apply(&self, consumer_name: &str, event: &Event) -> Result<ApplyOutcome>;

    /// Removes a record written by `try_apply`, used as compensating
    /// cleanup when the consumer's mutation fails after the ledger write.
    async fn revoke(&self, consumer_name: &str, event_id: EventId) -> Result<()>;

    /// Returns the apply record for a pair, if present.
    async fn get(&self, consumer_name: &str, event_id: EventId)
    -> Result<Option<ConsumerApplyRecord>>;
}

/// Digest of an event's payload recorded for audit alongside the apply row.
pub fn result_digest(event: &Event) -> String {
    format!("{}:{}", event.event_type, event.aggregate_key)
}
