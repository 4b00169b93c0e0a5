//! Checkout and order query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{OrderId, TenantId, UserId};
use domain::{LineItem, Money, Order, PaymentMethod, ShippingAddress};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Option<String>,
    pub payment_method: String,
    pub line_items: Vec<LineItemRequest>,
    pub shipping_address: ShippingAddressRequest,
}

#[derive(Deserialize)]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct ShippingAddressRequest {
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: String,
    pub status: String,
    pub total_cents: i64,
    pub line_items: Vec<LineItemResponse>,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub order_id: String,
    pub status: String,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct ResumeResponse {
    pub order_id: String,
    pub status: String,
}

fn parse_user_id(raw: Option<&str>) -> Result<UserId, ApiError> {
    match raw {
        Some(raw) => {
            let uuid = uuid::Uuid::parse_str(raw)
                .map_err(|e| ApiError::BadRequest(format!("Invalid user_id: {e}")))?;
            Ok(UserId::from_uuid(uuid))
        }
        None => Ok(UserId::new()),
    }
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

fn order_to_response(order: &Order) -> OrderResponse {
    OrderResponse {
        order_id: order.order_id.to_string(),
        user_id: order.user_id.to_string(),
        status: order.status.to_string(),
        total_cents: order.total.cents(),
        line_items: order
            .line_items
            .iter()
            .map(|item| LineItemResponse {
                product_id: item.product_id.to_string(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price.cents(),
            })
            .collect(),
    }
}

// -- Handlers --

/// POST /tenants/{tenant}/orders — checkout: runs the fulfillment saga to
/// a terminal status before responding.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let tenant_id = TenantId::new(tenant);
    let user_id = parse_user_id(req.user_id.as_deref())?;

    let line_items: Vec<LineItem> = req
        .line_items
        .iter()
        .map(|item| {
            LineItem::new(
                item.product_id.as_str(),
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
        })
        .collect();

    let address = ShippingAddress {
        line1: req.shipping_address.line1,
        city: req.shipping_address.city,
        postal_code: req.shipping_address.postal_code,
        country: req.shipping_address.country,
    };

    let order_id = state
        .coordinator
        .create_order(
            tenant_id.clone(),
            user_id,
            line_items,
            PaymentMethod::new(req.payment_method),
            address,
        )
        .await?;

    let order = state
        .coordinator
        .orders()
        .get_required(&tenant_id, order_id)
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order_id.to_string(),
            status: order.value.status.to_string(),
        }),
    ))
}

/// GET /tenants/{tenant}/orders/{id} — loads one order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<OrderResponse>, ApiError> {
    let tenant_id = TenantId::new(tenant);
    let order_id = parse_order_id(&id)?;

    let order = state
        .coordinator
        .orders()
        .get_required(&tenant_id, order_id)
        .await?;

    Ok(Json(order_to_response(&order.value)))
}

/// GET /tenants/{tenant}/orders — lists the tenant's orders from the
/// search index projection.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
) -> Result<Json<Vec<OrderSummaryResponse>>, ApiError> {
    let tenant_id = TenantId::new(tenant);

    let entries = state.search_index.list_tenant(&tenant_id).await;
    Ok(Json(
        entries
            .into_iter()
            .map(|entry| OrderSummaryResponse {
                order_id: entry.order_id.to_string(),
                status: entry.status,
                total_cents: entry.total_cents,
            })
            .collect(),
    ))
}

/// POST /tenants/{tenant}/orders/{id}/resume — resumes an interrupted
/// saga from its persisted status.
#[tracing::instrument(skip(state))]
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<ResumeResponse>, ApiError> {
    let tenant_id = TenantId::new(tenant);
    let order_id = parse_order_id(&id)?;

    let status = state.coordinator.resume(&tenant_id, order_id).await?;
    Ok(Json(ResumeResponse {
        order_id: order_id.to_string(),
        status: status.to_string(),
    }))
}
