//! Order endpoints: checkout, queries, status changes and cancellation.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderRole, OrderStatus, PaymentId, PaymentMethod, PaymentStatus, ProductId};
use dispatch::Dispatcher;
use domain::{
    CancelOrder, CheckoutRequest, Customer, DeliveryAddress, Order, OrderError, OrderService,
    UpdateStatus,
};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::auth::Identity;
use crate::cache::ResponseCache;
use crate::error::ApiError;

/// Cache operation for single order summaries.
pub const ORDER_SUMMARY: &str = "order_summary";

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub order_service: OrderService<S, Arc<Dispatcher>>,
    pub dispatcher: Arc<Dispatcher>,
    pub cache: Arc<ResponseCache<Order>>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    pub status: OrderStatus,
    pub role: OrderRole,
    pub order_date: DateTime<Utc>,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub guest_email: Option<String>,
    pub delivery_address: DeliveryAddress,
    pub payment: Option<PaymentSummary>,
    pub items: Vec<OrderItemResponse>,
    pub user: Option<Customer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub id: PaymentId,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
    pub message: &'static str,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            status: order.status(),
            role: order.role(),
            order_date: order.created_at(),
            total_cents: order.total().cents(),
            notes: order.notes().map(str::to_string),
            guest_email: order.guest_email().map(str::to_string),
            delivery_address: order.address().clone(),
            payment: order.payment().map(|p| PaymentSummary {
                id: p.id,
                method: p.method,
                status: p.status,
            }),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    image_url: item.image_url.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    subtotal_cents: item.subtotal().cents(),
                })
                .collect(),
            user: order.customer().cloned(),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order from a cart.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(request) = payload?;
    let order = state.order_service.checkout(request, &caller).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: list the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let caller = identity.require_user()?;
    let Some(user_id) = caller.user_id() else {
        return Err(ApiError::Unauthorized("caller has no user id".to_string()));
    };

    let orders = state.order_service.orders_for_user(user_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: load one order the caller may see.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    identity: Identity,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let caller = identity.require_user()?;
    let key = order_id.to_string();

    let order = match state.cache.get(ORDER_SUMMARY, &key).await {
        Some(order) => {
            if !caller.can_manage(order.user_id()) {
                return Err(ApiError::Domain(
                    OrderError::AccessDenied(format!("caller may not view order {order_id}"))
                        .into(),
                ));
            }
            order
        }
        None => {
            let seen = state.cache.generation().await;
            let order = state.order_service.get_order(order_id, &caller).await?;
            state
                .cache
                .insert_if_current(ORDER_SUMMARY, &key, order.clone(), seen)
                .await;
            order
        }
    };

    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/{id}/status: move an order to another status.
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    identity: Identity,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let caller = identity.require_user()?;
    let Json(body) = payload?;

    let order = state
        .order_service
        .update_status(UpdateStatus::new(order_id, body.status), &caller)
        .await?;
    state.cache.invalidate(ORDER_SUMMARY, &order_id.to_string()).await;

    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel: cancel an order.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    identity: Identity,
) -> Result<Json<CancelResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let caller = identity.require_user()?;

    let order = state
        .order_service
        .cancel_order(CancelOrder::new(order_id), &caller)
        .await?;
    state.cache.invalidate(ORDER_SUMMARY, &order_id.to_string()).await;

    Ok(Json(CancelResponse {
        order_id,
        status: order.status(),
        payment_status: order.payment().map(|p| p.status),
        message: "order cancelled",
    }))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID format: {e}")))?;
    Ok(OrderId::from(uuid))
}
