use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::models::{
    CreateOrderRequest, Order, OrderId, OrderStatus, OrderStatusUpdate, PageRequest,
    RepositoryError,
};
use crate::repositories::OrderRepository;

/// Shared application state handed to every order handler
#[derive(Clone)]
pub struct ApiState {
    pub repository: Arc<dyn OrderRepository>,
}

const DEFAULT_PAGE_SIZE: u32 = 50;

/// Query parameters for listing orders
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub cursor: u64,
    pub size: Option<u32>,
}

/// Response for one page of orders. `next` is omitted once enumeration is
/// complete.
#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub items: Vec<Order>,
    #[serde(skip_serializing_if = "cursor_exhausted")]
    pub next: u64,
}

fn cursor_exhausted(cursor: &u64) -> bool {
    *cursor == 0
}

/// Create the order router with all endpoints
pub fn create_order_router(repository: Arc<dyn OrderRepository>) -> Router {
    let state = ApiState { repository };

    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route(
            "/orders/:id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .with_state(state)
}

/// Create a new order with a generated id and a UTC creation timestamp
#[instrument(name = "create_order", skip(state, request), fields(customer_id = %request.customer_id))]
pub async fn create_order(
    State(state): State<ApiState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), (StatusCode, Json<Value>)> {
    let order = Order::new(request);
    info!("Creating order {}", order.order_id);

    match state.repository.insert(&order).await {
        Ok(()) => Ok((StatusCode::CREATED, Json(order))),
        Err(err) => {
            error!("Failed to insert order: {}", err);
            Err(repository_error_to_response(err))
        }
    }
}

/// List one page of orders
#[instrument(name = "list_orders", skip(state), fields(cursor = %query.cursor))]
pub async fn list_orders(
    State(state): State<ApiState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, (StatusCode, Json<Value>)> {
    // Both backends require a positive fetch size (SSCAN rejects COUNT 0).
    let page = PageRequest {
        size: query.size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
        cursor: query.cursor,
    };

    match state.repository.find_all(page).await {
        Ok(result) => {
            info!("Listed {} orders", result.orders.len());
            Ok(Json(OrderListResponse {
                items: result.orders,
                next: result.cursor,
            }))
        }
        Err(err) => {
            error!("Failed to list orders: {}", err);
            Err(repository_error_to_response(err))
        }
    }
}

/// Get a specific order by id
#[instrument(name = "get_order", skip(state), fields(order_id = %id))]
pub async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, (StatusCode, Json<Value>)> {
    match state.repository.find_by_id(id).await {
        Ok(order) => Ok(Json(order)),
        Err(err) => {
            error!("Failed to get order {}: {}", id, err);
            Err(repository_error_to_response(err))
        }
    }
}

/// Advance an order's status. The transition rules live here, not in the
/// repository: shipping is allowed once, completing requires a shipped and
/// not yet completed order.
#[instrument(name = "update_order", skip(state, request), fields(order_id = %id))]
pub async fn update_order(
    State(state): State<ApiState>,
    Path(id): Path<OrderId>,
    Json(request): Json<OrderStatusUpdate>,
) -> Result<Json<Order>, (StatusCode, Json<Value>)> {
    let mut order = match state.repository.find_by_id(id).await {
        Ok(order) => order,
        Err(err) => {
            error!("Failed to get order {}: {}", id, err);
            return Err(repository_error_to_response(err));
        }
    };

    let now = Utc::now();
    match request.status {
        OrderStatus::Shipped => {
            if order.shipped_at.is_some() {
                return Err(bad_request("order has already been shipped"));
            }
            order.shipped_at = Some(now);
        }
        OrderStatus::Completed => {
            if order.shipped_at.is_none() {
                return Err(bad_request("order has not been shipped yet"));
            }
            if order.completed_at.is_some() {
                return Err(bad_request("order has already been completed"));
            }
            order.completed_at = Some(now);
        }
    }

    match state.repository.update(&order).await {
        Ok(()) => {
            info!("Order status advanced");
            Ok(Json(order))
        }
        Err(err) => {
            error!("Failed to update order {}: {}", id, err);
            Err(repository_error_to_response(err))
        }
    }
}

/// Delete an order and all of its line items
#[instrument(name = "delete_order", skip(state), fields(order_id = %id))]
pub async fn delete_order(
    State(state): State<ApiState>,
    Path(id): Path<OrderId>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    match state.repository.delete_by_id(id).await {
        Ok(()) => {
            info!("Order deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(err) => {
            error!("Failed to delete order {}: {}", id, err);
            Err(repository_error_to_response(err))
        }
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": message,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Convert RepositoryError to HTTP response
fn repository_error_to_response(err: RepositoryError) -> (StatusCode, Json<Value>) {
    let status = match err {
        RepositoryError::NotFound { .. } => StatusCode::NOT_FOUND,
        RepositoryError::Conflict { .. } => StatusCode::CONFLICT,
        RepositoryError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::Corrupt { .. } | RepositoryError::TransactionFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(json!({
            "error": err.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}
