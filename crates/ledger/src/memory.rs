use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use common::EventId;
use event_bus::Event;

use crate::{ApplyLedger, ApplyOutcome, ConsumerApplyRecord, Result, result_digest};

/// In-memory apply ledger.
///
/// Insert-if-absent under one lock gives the same atomicity as the unique
/// index a database-backed ledger would rely on.
#[derive(Clone, Default)]
pub struct InMemoryApplyLedger {
    records: Arc<Mutex<HashMap<(String, EventId), ConsumerApplyRecord>>>,
}

impl InMemoryApplyLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of apply records.
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl ApplyLedger for InMemoryApplyLedger {
    async fn try_apply(&self, consumer_name: &str, event: &Event) -> Result<ApplyOutcome> {
        let mut records = self.records.lock().unwrap();
        let key = (consumer_name.to_string(), event.event_id);

        if records.contains_key(&key) {
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        records.insert(
            key,
            ConsumerApplyRecord {
                consumer_name: consumer_name.to_string(),
                event_id: event.event_id,
                applied_at: Utc::now(),
                result_digest: result_digest(event),
            },
        );
        Ok(ApplyOutcome::FirstApplication)
    }

    async fn revoke(&self, consumer_name: &str, event_id: EventId) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.remove(&(consumer_name.to_string(), event_id));
        Ok(())
    }

    async fn get(
        &self,
        consumer_name: &str,
        event_id: EventId,
    ) -> Result<Option<ConsumerApplyRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&(consumer_name.to_string(), event_id)).cloned())
    }
}
