//! Admin REST endpoints: list orders, look one up, move it through its
//! lifecycle. Also lets an operator re-list an asset collection after
//! uploading new fonts or backgrounds.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::assets::{AssetCategory, AssetPager};
use crate::error::DatabaseError;
use crate::order::{OrderRepository, OrderStatus};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// State shared across admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub orders: Arc<dyn OrderRepository>,
    pub pager: Arc<AssetPager>,
    /// Reported by `/health`.
    pub service: String,
}

/// Build the admin router.
pub fn admin_routes(
    orders: Arc<dyn OrderRepository>,
    pager: Arc<AssetPager>,
    service: impl Into<String>,
) -> Router {
    let state = AdminState {
        orders,
        pager,
        service: service.into(),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/orders", get(list_orders))
        .route("/api/orders/{number}", get(get_order))
        .route("/api/orders/{number}/status", post(update_status))
        .route("/api/assets/{collection}/refresh", post(refresh_assets))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AdminState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.service
    }))
}

// ── Orders ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_orders(
    State(state): State<AdminState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<OrderStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => return bad_request(&e),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    match state.orders.list_orders(status, limit).await {
        Ok(orders) => Json(orders).into_response(),
        Err(e) => database_error(e),
    }
}

async fn get_order(State(state): State<AdminState>, Path(number): Path<String>) -> Response {
    match state.orders.get_order(&number).await {
        Ok(Some(order)) => Json(order).into_response(),
        Ok(None) => not_found(&number),
        Err(e) => database_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
}

async fn update_status(
    State(state): State<AdminState>,
    Path(number): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Response {
    let status: OrderStatus = match body.status.parse() {
        Ok(s) => s,
        Err(e) => return bad_request(&e),
    };

    match state.orders.update_order_status(&number, status).await {
        Ok(order) => {
            info!(order_number = %number, status = %status, "Order status updated");
            Json(order).into_response()
        }
        Err(DatabaseError::NotFound { .. }) => not_found(&number),
        Err(e) => database_error(e),
    }
}

// ── Assets ──────────────────────────────────────────────────────────────

async fn refresh_assets(
    State(state): State<AdminState>,
    Path(collection): Path<String>,
) -> Response {
    let Some(category) = AssetCategory::from_collection(&collection) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("Unknown asset collection {collection}")})),
        )
            .into_response();
    };
    state.pager.refresh(category).await;
    Json(serde_json::json!({"refreshed": category.collection()})).into_response()
}

// ── Responses ───────────────────────────────────────────────────────────

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn not_found(number: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("Order {number} not found")})),
    )
        .into_response()
}

fn database_error(e: DatabaseError) -> Response {
    match e {
        DatabaseError::NotFound { id, .. } => not_found(&id),
        DatabaseError::Constraint(msg) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": msg})),
        )
            .into_response(),
        other => {
            warn!(error = %other, "Admin request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Internal error"})),
            )
                .into_response()
        }
    }
}
