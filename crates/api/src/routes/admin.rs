//! Administrative order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::OrderStatus;
use serde::Deserialize;

use super::orders::{OrderResponse, to_responses};
use super::parse_id;
use crate::auth::RequireAdmin;
use crate::error::ApiError;
use crate::{AppState, StorefrontStore};

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// GET /admin/orders: every order, newest first.
#[tracing::instrument(skip(state, admin), fields(admin = %admin.user_id))]
pub async fn list_orders<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.get_all_orders(&admin).await?;
    Ok(Json(to_responses(orders)))
}

/// PATCH /admin/orders/{id}/status: move an order to a new status.
#[tracing::instrument(skip(state, admin, req), fields(admin = %admin.user_id))]
pub async fn update_status<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let status: OrderStatus = req.status.parse()?;
    let order = state
        .orders
        .update_status(&admin, order_id, status)
        .await?;
    Ok(Json(order.into()))
}
