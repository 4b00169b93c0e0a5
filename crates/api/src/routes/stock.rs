//! Stock administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{ProductId, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize)]
pub struct SetStockRequest {
    pub stock: u32,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub stock: u32,
    pub reserved: u32,
    pub available: u32,
}

/// PUT /tenants/{tenant}/stock/{product} — sets the physical stock level,
/// creating the counter record on first write.
#[tracing::instrument(skip(state, req))]
pub async fn set(
    State(state): State<Arc<AppState>>,
    Path((tenant, product)): Path<(String, String)>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let tenant_id = TenantId::new(tenant);
    let product_id = ProductId::new(product);

    let record = state
        .engine
        .set_stock(&tenant_id, &product_id, req.stock)
        .await?;

    Ok(Json(StockResponse {
        product_id: record.product_id.to_string(),
        stock: record.stock,
        reserved: record.reserved,
        available: record.available(),
    }))
}

/// GET /tenants/{tenant}/stock/{product} — reads the counter record.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((tenant, product)): Path<(String, String)>,
) -> Result<Json<StockResponse>, ApiError> {
    let tenant_id = TenantId::new(tenant);
    let product_id = ProductId::new(product);

    let record = state
        .engine
        .get_record(&tenant_id, &product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No stock record for {product_id}")))?;

    Ok(Json(StockResponse {
        product_id: record.product_id.to_string(),
        stock: record.stock,
        reserved: record.reserved,
        available: record.available(),
    }))
}
