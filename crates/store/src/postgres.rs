use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Row};

use common::TenantId;

use crate::{
    Result, StoreError, Version, Versioned,
    store::RecordStore,
};

/// PostgreSQL-backed record store implementation.
///
/// All record kinds share one `records` table; `kind` partitions the
/// keyspace per store instance and keys/payloads are stored as JSON.
/// Compare-and-swap updates are a single conditional `UPDATE` on the
/// version column.
pub struct PostgresStore<K, V> {
    pool: PgPool,
    kind: &'static str,
    _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> PostgresStore<K, V> {
    /// Creates a new PostgreSQL record store for one record kind.
    pub fn new(pool: PgPool, kind: &'static str) -> Self {
        Self {
            pool,
            kind,
            _phantom: PhantomData,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

impl<K, V> Clone for PostgresStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            kind: self.kind,
            _phantom: PhantomData,
        }
    }
}

fn encode_key<K: Serialize>(key: &K) -> Result<String> {
    Ok(serde_json::to_string(key)?)
}

#[async_trait]
impl<K, V> RecordStore<K, V> for PostgresStore<K, V>
where
    K: Serialize + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, tenant_id: &TenantId, key: &K) -> Result<Option<Versioned<V>>> {
        let record_key = encode_key(key)?;

        let row = sqlx::query(
            "SELECT payload, version FROM records \
             WHERE tenant_id = $1 AND kind = $2 AND record_key = $3",
        )
        .bind(tenant_id.as_str())
        .bind(self.kind)
        .bind(&record_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload")?;
                let version: i64 = row.try_get("version")?;
                let value: V = serde_json::from_value(payload)?;
                Ok(Some(Versioned::new(value, Version::new(version))))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, tenant_id: &TenantId, key: &K, value: V) -> Result<Version> {
        let record_key = encode_key(key)?;
        let payload = serde_json::to_value(&value)?;
        let version = Version::first();

        sqlx::query(
            "INSERT INTO records (tenant_id, kind, record_key, payload, version) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(tenant_id.as_str())
        .bind(self.kind)
        .bind(&record_key)
        .bind(&payload)
        .bind(version.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_tenant_kind_key")
            {
                return StoreError::AlreadyExists {
                    key: format!("{tenant_id}/{record_key}"),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(version)
    }

    async fn update(
        &self,
        tenant_id: &TenantId,
        key: &K,
        value: V,
        expected: Version,
    ) -> Result<Version> {
        let record_key = encode_key(key)?;
        let payload = serde_json::to_value(&value)?;
        let new_version = expected.next();

        let result = sqlx::query(
            "UPDATE records SET payload = $4, version = $5, updated_at = now() \
             WHERE tenant_id = $1 AND kind = $2 AND record_key = $3 AND version = $6",
        )
        .bind(tenant_id.as_str())
        .bind(self.kind)
        .bind(&record_key)
        .bind(&payload)
        .bind(new_version.as_i64())
        .bind(expected.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(new_version);
        }

        // The conditional write matched nothing: either the record is gone
        // or another writer advanced the version first.
        let actual: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM records \
             WHERE tenant_id = $1 AND kind = $2 AND record_key = $3",
        )
        .bind(tenant_id.as_str())
        .bind(self.kind)
        .bind(&record_key)
        .fetch_optional(&self.pool)
        .await?;

        match actual {
            Some(actual) => {
                metrics::counter!("store_version_conflicts_total").increment(1);
                Err(StoreError::VersionConflict {
                    key: format!("{tenant_id}/{record_key}"),
                    expected,
                    actual: Version::new(actual),
                })
            }
            None => Err(StoreError::NotFound {
                key: format!("{tenant_id}/{record_key}"),
            }),
        }
    }

    async fn list_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Versioned<V>>> {
        let rows = sqlx::query(
            "SELECT payload, version FROM records \
             WHERE tenant_id = $1 AND kind = $2 \
             ORDER BY record_key",
        )
        .bind(tenant_id.as_str())
        .bind(self.kind)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row.try_get("payload")?;
            let version: i64 = row.try_get("version")?;
            let value: V = serde_json::from_value(payload)?;
            records.push(Versioned::new(value, Version::new(version)));
        }
        Ok(records)
    }
}
