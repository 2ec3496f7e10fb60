//! Checkout and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, OrderItem};
use serde::Serialize;

use super::parse_id;
use crate::auth::RequireUser;
use crate::error::ApiError;
use crate::{AppState, StorefrontStore};

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub price_cents: i64,
    pub subtotal_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            status: order.status.to_string(),
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            total_cents: order.total_amount.cents(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            price_cents: item.price.cents(),
            subtotal_cents: item.subtotal().cents(),
        }
    }
}

pub(crate) fn to_responses(orders: Vec<Order>) -> Vec<OrderResponse> {
    orders.into_iter().map(OrderResponse::from).collect()
}

// -- Handlers --

/// POST /orders/checkout: turn the caller's cart into an order.
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn checkout<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireUser(identity): RequireUser,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.coordinator.checkout(identity.user_id).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn list<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireUser(identity): RequireUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.get_orders(identity.user_id).await?;
    Ok(Json(to_responses(orders)))
}

/// GET /orders/{id}: one order, visible to its owner or an administrator.
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireUser(identity): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.orders.get_order(&identity, order_id).await?;
    Ok(Json(order.into()))
}
