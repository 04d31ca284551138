//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use choreography::{NewOrder, NewOrderItem, OrderLifecycleManager};
use common::{CustomerId, Money, OrderId};
use domain::{CustomerContact, Order, OrderStatus, Payment, PaymentRepository};
use monitoring::{EventLogStore, HealthChecker, MetricsCollector};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orders: Arc<OrderLifecycleManager>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub event_log: Arc<dyn EventLogStore>,
    pub metrics_collector: Arc<MetricsCollector>,
    pub health_checker: Arc<HealthChecker>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: String,
    pub delivery_address: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub status: String,
    pub delivery_address: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub payment_number: String,
    pub order_number: String,
    pub status: String,
    pub amount_cents: i64,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        OrderResponse {
            id: order.id.to_string(),
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.to_string(),
            status: order.status.to_string(),
            delivery_address: order.delivery_address.clone(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.clone(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    total_price_cents: item.total_price.cents(),
                })
                .collect(),
            total_cents: order.total_amount.cents(),
            created_at: order.created_at,
        }
    }
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        PaymentResponse {
            id: payment.id.to_string(),
            payment_number: payment.payment_number.clone(),
            order_number: payment.order_number.clone(),
            status: payment.status.to_string(),
            amount_cents: payment.amount.cents(),
            transaction_id: payment.transaction_id.clone(),
            failure_reason: payment.failure_reason.clone(),
            retry_count: payment.retry_count,
            next_retry_at: payment.next_retry_at,
        }
    }
}

// -- Handlers --

/// POST /orders — validate and persist a new order; publishing
/// `ORDER_CREATED` kicks off the choreography.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderResponse>), ApiError> {
    let customer_id = match &req.customer_id {
        Some(raw) => uuid::Uuid::parse_str(raw)
            .map(CustomerId::from_uuid)
            .map_err(|e| ApiError::BadRequest(format!("invalid customer_id: {e}")))?,
        None => CustomerId::new(),
    };

    let order = state
        .orders
        .create_order(NewOrder {
            customer_id,
            contact: CustomerContact {
                name: req.customer_name,
                email: req.customer_email,
                phone: req.customer_phone,
            },
            delivery_address: req.delivery_address,
            items: req
                .items
                .into_iter()
                .map(|item| NewOrderItem {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: Money::from_cents(item.unit_price_cents),
                })
                .collect(),
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json((&order).into())))
}

/// GET /orders/:id
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orders
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json((&order).into()))
}

/// GET /orders/:id/payment — the payment driven by this order's event.
#[tracing::instrument(skip(state))]
pub async fn payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let payment = state
        .payment_repo
        .find_by_order_id(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No payment for order {id}")))?;
    Ok(Json((&payment).into()))
}

/// POST /orders/:id/status — explicit status transition.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.update_status(order_id, req.status).await?;
    Ok(Json((&order).into()))
}

/// POST /orders/:id/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.cancel_order(order_id).await?;
    Ok(Json((&order).into()))
}

/// GET /customers/:id/orders
#[tracing::instrument(skip(state))]
pub async fn by_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer_id = uuid::Uuid::parse_str(&id)
        .map(CustomerId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("invalid customer id: {e}")))?;
    let orders = state.orders.find_by_customer(customer_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(OrderId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))
}
