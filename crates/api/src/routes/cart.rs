//! Cart endpoints for the authenticated caller.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CartItemId, ProductId};
use domain::{CartItem, CartLine, CartSummary};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::auth::RequireUser;
use crate::error::ApiError;
use crate::{AppState, StorefrontStore};

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub id: String,
    pub user_id: String,
    pub items: Vec<CartLineResponse>,
    pub estimated_total_cents: i64,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
    pub available_stock: u32,
    pub added_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub id: String,
    pub cart_id: String,
    pub product_id: String,
    pub quantity: u32,
}

impl From<CartSummary> for CartResponse {
    fn from(summary: CartSummary) -> Self {
        Self {
            id: summary.cart_id.to_string(),
            user_id: summary.user_id.to_string(),
            estimated_total_cents: summary.estimated_total.cents(),
            items: summary.lines.iter().map(CartLineResponse::from).collect(),
        }
    }
}

impl From<&CartLine> for CartLineResponse {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.item.id.to_string(),
            product_id: line.item.product_id.to_string(),
            product_name: line.product_name.clone(),
            quantity: line.item.quantity,
            unit_price_cents: line.unit_price.cents(),
            subtotal_cents: line.subtotal.cents(),
            available_stock: line.available_stock,
            added_at: line.item.created_at,
        }
    }
}

impl From<CartItem> for CartItemResponse {
    fn from(item: CartItem) -> Self {
        Self {
            id: item.id.to_string(),
            cart_id: item.cart_id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
        }
    }
}

// -- Handlers --

/// GET /cart: the caller's cart with live prices.
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireUser(identity): RequireUser,
) -> Result<Json<CartResponse>, ApiError> {
    let summary = state.carts.get_cart(identity.user_id).await?;
    Ok(Json(summary.into()))
}

/// POST /cart: add a product to the caller's cart.
#[tracing::instrument(skip(state, identity, req), fields(user_id = %identity.user_id))]
pub async fn add_item<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireUser(identity): RequireUser,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItemResponse>), ApiError> {
    let product_id: ProductId = parse_id("product", &req.product_id)?;
    let item = state
        .carts
        .add_item(identity.user_id, product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// PUT /cart/items/{id}: replace an item's quantity.
#[tracing::instrument(skip(state, identity, req), fields(user_id = %identity.user_id))]
pub async fn update_item<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireUser(identity): RequireUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartItemResponse>, ApiError> {
    let item_id: CartItemId = parse_id("cart item", &id)?;
    let item = state
        .carts
        .update_item(identity.user_id, item_id, req.quantity)
        .await?;
    Ok(Json(item.into()))
}

/// DELETE /cart/items/{id}: remove an item.
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn remove_item<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    RequireUser(identity): RequireUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let item_id: CartItemId = parse_id("cart item", &id)?;
    state.carts.remove_item(identity.user_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
