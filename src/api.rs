//! HTTP surface over the stock core, carts, checkout and the admin inbox.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::domain::aggregates::{Cart, Notification, NotificationFilter, Order};
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::inventory::{
    AvailabilityReport, BulkLineResult, InventoryService, LowStockEntry, StockAdjustment, StockQuery,
    StockRequestItem, StockThresholds, StockUpdate, StockView, SyncReport,
};
use crate::publisher::EventPublisher;
use crate::services::{AddCartItem, CartService, CheckoutService, NotificationService, PlacedOrder};
use crate::store::Store;
use crate::InventoryError;

type ApiError = (StatusCode, String);

pub struct AppState<S> {
    pub inventory: InventoryService<S>,
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub notifications: NotificationService<S>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inventory: self.inventory.clone(), carts: self.carts.clone(), checkout: self.checkout.clone(),
            notifications: self.notifications.clone(), publisher: self.publisher.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, thresholds: StockThresholds, publisher: Arc<dyn EventPublisher>) -> Self {
        let inventory = InventoryService::new(store.clone(), thresholds);
        Self {
            carts: CartService::new(inventory.clone()),
            checkout: CheckoutService::new(inventory.clone(), publisher.clone()),
            notifications: NotificationService::new(store),
            inventory,
            publisher,
        }
    }
}

pub fn router<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-inventory"})) }))
        .route("/api/v1/stock", get(get_stock::<S>))
        .route("/api/v1/stock/validate", post(validate_stock::<S>))
        .route("/api/v1/admin/stock/sync", post(sync_stock_statuses::<S>))
        .route("/api/v1/admin/stock/bulk", post(bulk_update_stock::<S>))
        .route("/api/v1/admin/stock/low", get(low_stock::<S>))
        .route("/api/v1/admin/products/:product_id/variants/:variant_id/stock", put(set_variant_stock::<S>))
        .route("/api/v1/cart/:user_id", get(get_cart::<S>).delete(clear_cart::<S>))
        .route("/api/v1/cart/:user_id/items", post(add_to_cart::<S>))
        .route("/api/v1/cart/:user_id/items/:variant_id", put(update_cart_item::<S>).delete(remove_cart_item::<S>))
        .route("/api/v1/orders", post(place_order::<S>))
        .route("/api/v1/orders/:id", get(get_order::<S>))
        .route("/api/v1/orders/:id/cancel", post(cancel_order::<S>))
        .route("/api/v1/orders/:id/refund", post(refund_order::<S>))
        .route("/api/v1/notifications", get(list_notifications::<S>))
        .route("/api/v1/notifications/unread-count", get(unread_count::<S>))
        .route("/api/v1/notifications/read-all", post(mark_all_read::<S>))
        .route("/api/v1/notifications/:id/read", post(mark_read::<S>))
        .route("/api/v1/notifications/:id/action", post(mark_action_taken::<S>))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

/// Maps a domain error to a status code. The body is the error's display
/// text, so stock shortfalls carry the available quantity.
pub fn error_response(e: InventoryError) -> ApiError {
    let status = match &e {
        InventoryError::NotFound(_) | InventoryError::CartItemNotFound | InventoryError::OrderNotFound => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. } | InventoryError::InvalidOrderState(_) => StatusCode::CONFLICT,
        InventoryError::InvalidQuantity(_) | InventoryError::CurrencyMismatch => StatusCode::BAD_REQUEST,
        InventoryError::TransactionAborted(_) | InventoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    }
    (status, e.to_string())
}

fn invalid(e: validator::ValidationErrors) -> ApiError { (StatusCode::BAD_REQUEST, e.to_string()) }

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

async fn get_stock<S: Store>(State(s): State<AppState<S>>, Query(q): Query<StockQuery>) -> Result<Json<StockView>, ApiError> {
    s.inventory.get_variant_stock(&q).await.map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateStockRequest {
    #[validate(length(min = 1))]
    pub items: Vec<StockRequestItem>,
}

async fn validate_stock<S: Store>(State(s): State<AppState<S>>, Json(r): Json<ValidateStockRequest>) -> Result<Json<AvailabilityReport>, ApiError> {
    r.validate().map_err(invalid)?;
    s.inventory.validate_stock_availability(&r.items).await.map(Json).map_err(error_response)
}

async fn sync_stock_statuses<S: Store>(State(s): State<AppState<S>>) -> Result<Json<SyncReport>, ApiError> {
    let report = s.inventory.sync_all_stock_statuses().await.map_err(error_response)?;
    s.publisher.publish(&DomainEvent::Inventory(InventoryEvent::StatusReconciled { updated_count: report.updated_count })).await;
    Ok(Json(report))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetStockRequest {
    #[validate(range(min = 0))]
    pub stock: i64,
}

async fn set_variant_stock<S: Store>(
    State(s): State<AppState<S>>, Path((product_id, variant_id)): Path<(String, String)>, Json(r): Json<SetStockRequest>,
) -> Result<Json<StockAdjustment>, ApiError> {
    r.validate().map_err(invalid)?;
    let adjustment = s.inventory.set_variant_stock(&product_id, &variant_id, r.stock).await.map_err(error_response)?;
    s.publisher.publish(&adjustment.event()).await;
    Ok(Json(adjustment))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkStockRequest {
    #[validate(length(min = 1, max = 500))]
    pub updates: Vec<StockUpdate>,
}

async fn bulk_update_stock<S: Store>(State(s): State<AppState<S>>, Json(r): Json<BulkStockRequest>) -> Result<Json<Vec<BulkLineResult>>, ApiError> {
    r.validate().map_err(invalid)?;
    let results = s.inventory.bulk_update_stock(&r.updates).await;
    let events: Vec<DomainEvent> = results.iter().filter_map(|l| l.adjustment.as_ref()).map(StockAdjustment::event).collect();
    s.publisher.publish_all(&events).await;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct LowStockParams { pub threshold: Option<u32> }

async fn low_stock<S: Store>(State(s): State<AppState<S>>, Query(p): Query<LowStockParams>) -> Result<Json<Vec<LowStockEntry>>, ApiError> {
    let threshold = p.threshold.unwrap_or(s.inventory.thresholds().low_stock);
    s.inventory.low_stock_report(threshold).await.map(Json).map_err(error_response)
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

async fn get_cart<S: Store>(State(s): State<AppState<S>>, Path(user_id): Path<String>) -> Result<Json<Cart>, ApiError> {
    s.carts.get_cart(&user_id).await.map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[serde(flatten)]
    pub target: StockQuery,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

async fn add_to_cart<S: Store>(
    State(s): State<AppState<S>>, Path(user_id): Path<String>, Json(r): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<Cart>), ApiError> {
    r.validate().map_err(invalid)?;
    let cart = s.carts.add_item(&user_id, AddCartItem { target: r.target, quantity: r.quantity }).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(cart)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0))]
    pub quantity: i64,
}

async fn update_cart_item<S: Store>(
    State(s): State<AppState<S>>, Path((user_id, variant_id)): Path<(String, String)>, Json(r): Json<UpdateQuantityRequest>,
) -> Result<Json<Cart>, ApiError> {
    r.validate().map_err(invalid)?;
    s.carts.update_quantity(&user_id, &variant_id, r.quantity).await.map(Json).map_err(error_response)
}

async fn remove_cart_item<S: Store>(State(s): State<AppState<S>>, Path((user_id, variant_id)): Path<(String, String)>) -> Result<Json<Cart>, ApiError> {
    s.carts.remove_item(&user_id, &variant_id).await.map(Json).map_err(error_response)
}

async fn clear_cart<S: Store>(State(s): State<AppState<S>>, Path(user_id): Path<String>) -> Result<StatusCode, ApiError> {
    s.carts.clear_cart(&user_id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(alias = "user_id")]
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
}

async fn place_order<S: Store>(State(s): State<AppState<S>>, Json(r): Json<PlaceOrderRequest>) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    r.validate().map_err(invalid)?;
    let placed = s.checkout.place_order(&r.user_id).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(placed)))
}

async fn get_order<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    s.checkout.get_order(&id).await.map(Json).map_err(error_response)
}

async fn cancel_order<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    s.checkout.cancel_order(&id).await.map(Json).map_err(error_response)
}

async fn refund_order<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    s.checkout.refund_order(&id).await.map(Json).map_err(error_response)
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

async fn list_notifications<S: Store>(State(s): State<AppState<S>>, Query(f): Query<NotificationFilter>) -> Result<Json<Vec<Notification>>, ApiError> {
    s.notifications.list(&f).await.map(Json).map_err(error_response)
}

async fn unread_count<S: Store>(State(s): State<AppState<S>>) -> Result<Json<serde_json::Value>, ApiError> {
    let count = s.notifications.unread_count().await.map_err(error_response)?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn mark_all_read<S: Store>(State(s): State<AppState<S>>) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = s.notifications.mark_all_read().await.map_err(error_response)?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn mark_read<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Notification>, ApiError> {
    s.notifications.mark_read(&id).await.map(Json).map_err(error_response)
}

async fn mark_action_taken<S: Store>(State(s): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Notification>, ApiError> {
    s.notifications.mark_action_taken(&id).await.map(Json).map_err(error_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let (status, body) = error_response(InventoryError::InsufficientStock { requested: 4, available: 3 });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "Insufficient stock. Available 3");
        assert_eq!(error_response(InventoryError::OrderNotFound).0, StatusCode::NOT_FOUND);
        assert_eq!(error_response(InventoryError::InvalidQuantity(0)).0, StatusCode::BAD_REQUEST);
        assert_eq!(error_response(InventoryError::Storage("down".into())).0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_validation() {
        assert!(SetStockRequest { stock: -1 }.validate().is_err());
        assert!(UpdateQuantityRequest { quantity: 0 }.validate().is_ok());
        assert!(ValidateStockRequest { items: vec![] }.validate().is_err());
        let add: AddToCartRequest = serde_json::from_value(serde_json::json!({"variantSku": "AB-1", "quantity": 0})).unwrap();
        assert_eq!(add.target.variant_sku.as_deref(), Some("AB-1"));
        assert!(add.validate().is_err());
    }
}
