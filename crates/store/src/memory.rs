use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use common::TenantId;

use crate::{
    Result, StoreError, Version, Versioned,
    store::RecordStore,
};

/// In-memory record store implementation for testing.
///
/// Stores records in a map keyed by (tenant, key) and provides the same
/// compare-and-swap semantics as the PostgreSQL implementation.
pub struct InMemoryStore<K, V> {
    records: Arc<RwLock<HashMap<(TenantId, K), Versioned<V>>>>,
}

impl<K, V> InMemoryStore<K, V> {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    /// Returns the total number of records stored, across all tenants.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

impl<K, V> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for InMemoryStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

#[async_trait]
impl<K, V> RecordStore<K, V> for InMemoryStore<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, tenant_id: &TenantId, key: &K) -> Result<Option<Versioned<V>>> {
        let records = self.records.read().await;
        Ok(records.get(&(tenant_id.clone(), key.clone())).cloned())
    }

    async fn insert(&self, tenant_id: &TenantId, key: &K, value: V) -> Result<Version> {
        let mut records = self.records.write().await;
        let map_key = (tenant_id.clone(), key.clone());

        if records.contains_key(&map_key) {
            return Err(StoreError::AlreadyExists {
                key: format!("{tenant_id}/{key:?}"),
            });
        }

        let version = Version::first();
        records.insert(map_key, Versioned::new(value, version));
        Ok(version)
    }

    async fn update(
        &self,
        tenant_id: &TenantId,
        key: &K,
        value: V,
        expected: Version,
    ) -> Result<Version> {
        let mut records = self.records.write().await;
        let map_key = (tenant_id.clone(), key.clone());

        let record = records.get_mut(&map_key).ok_or_else(|| StoreError::NotFound {
            key: format!("{tenant_id}/{key:?}"),
        })?;

        if record.version != expected {
            metrics::counter!("store_version_conflicts_total").increment(1);
            return Err(StoreError::VersionConflict {
                key: format!("{tenant_id}/{key:?}"),
                expected,
                actual: record.version,
            });
        }

        record.value = value;
        record.version = expected.next();
        Ok(record.version)
    }

    async fn list_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Versioned<V>>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|((tenant, _), _)| tenant == tenant_id)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
