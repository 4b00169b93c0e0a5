use async_trait::async_trait;

use common::TenantId;

use crate::{Result, Version, Versioned};

/// Core trait for tenant-scoped versioned record stores.
///
/// Every operation takes the tenant identity explicitly; there is no API
/// that reads or writes across tenants. Mutations go through either
/// `insert` (record must not exist) or `update` (compare-and-swap on the
/// record's version), so concurrent writers retry rather than block.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RecordStore<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Send + Sync,
{
    /// Retrieves a record by key.
    ///
    /// Returns None if no record exists for the tenant/key pair.
    async fn get(&self, tenant_id: &TenantId, key: &K) -> Result<Option<Versioned<V>>>;

    /// Inserts a new record.
    ///
    /// Fails with `AlreadyExists` if a record is present for the key.
    /// Returns the record's first version.
    async fn insert(&self, tenant_id: &TenantId, key: &K, value: V) -> Result<Version>;

    /// Replaces a record's value, conditional on its current version.
    ///
    /// Fails with `VersionConflict` if the stored version differs from
    /// `expected`, and with `NotFound` if the record does not exist.
    /// Returns the new version.
    async fn update(
        &self,
        tenant_id: &TenantId,
        key: &K,
        value: V,
        expected: Version,
    ) -> Result<Version>;

    /// Lists every record belonging to a tenant.
    ///
    /// This is the scan surface used for recovery (e.g. finding orders
    /// stuck in a non-terminal status after a restart).
    async fn list_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Versioned<V>>>;
}

/// Extension trait providing convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt<K, V>: RecordStore<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    /// Inserts a record if absent, otherwise returns the existing one.
    async fn get_or_insert(
        &self,
        tenant_id: &TenantId,
        key: &K,
        value: V,
    ) -> Result<Versioned<V>>
    where
        V: Clone + 'async_trait,
    {
        if let Some(existing) = self.get(tenant_id, key).await? {
            return Ok(existing);
        }
        match self.insert(tenant_id, key, value.clone()).await {
            Ok(version) => Ok(Versioned::new(value, version)),
            // Lost an insert race; the winner's record is authoritative.
            Err(crate::StoreError::AlreadyExists { key: k }) => self
                .get(tenant_id, key)
                .await?
                .ok_or(crate::StoreError::NotFound { key: k }),
            Err(e) => Err(e),
        }
    }
}

// Blanket implementation for all RecordStore implementations
impl<T, K, V> RecordStoreExt<K, V> for T
where
    T: RecordStore<K, V> + ?Sized,
    K: Send + Sync,
    V: Send + Sync,
{
}
