//! Stock core: resolution, validation, reservation and stock alerts.
//!
//! Reads here are advisory snapshots. The only write that must be atomic
//! against concurrent reservations is the conditional decrement performed by
//! [`InventoryService::reserve_stock`]; everything else is re-checked there.

mod admin;
mod emitter;
mod reservation;
mod resolver;
mod validator;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::Store;

pub use admin::{BulkLineResult, LowStockEntry, StockAdjustment, StockUpdate, SyncReport};
pub use emitter::{AlertSubject, NotificationEmitter};
pub use reservation::{Release, ReleaseOutcome, Reservation, ReservationOutcome};
pub use resolver::{Resolution, StockCode, StockView, VariantRef};
pub use validator::{AvailabilityReport, IssueReason, StockIssue};

/// Identifies a variant by any subset of keys. Keys are tried in the order
/// variant id, SKU, product id; the first one that matches wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuery {
    #[serde(default, alias = "variant_id")]
    pub variant_id: Option<String>,
    #[serde(default, alias = "variant_sku")]
    pub variant_sku: Option<String>,
    #[serde(default, alias = "product_id")]
    pub product_id: Option<String>,
}

impl StockQuery {
    pub fn by_variant(variant_id: impl Into<String>) -> Self {
        Self { variant_id: Some(variant_id.into()), ..Default::default() }
    }

    pub fn by_sku(sku: impl Into<String>) -> Self {
        Self { variant_sku: Some(sku.into()), ..Default::default() }
    }

    pub fn by_product(product_id: impl Into<String>) -> Self {
        Self { product_id: Some(product_id.into()), ..Default::default() }
    }

    /// Human-readable key list for error messages.
    pub fn describe(&self) -> String {
        let keys: Vec<String> = [("variant", &self.variant_id), ("sku", &self.variant_sku), ("product", &self.product_id)]
            .into_iter()
            .filter_map(|(label, v)| v.as_ref().map(|v| format!("{label} {v}")))
            .collect();
        if keys.is_empty() { "no key given".to_string() } else { keys.join(", ") }
    }
}

/// A variant and the quantity wanted of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRequestItem {
    #[serde(flatten)]
    pub target: StockQuery,
    pub quantity: i64,
}

impl StockRequestItem {
    pub fn new(target: StockQuery, quantity: i64) -> Self { Self { target, quantity } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockThresholds {
    /// Low-stock threshold for ordinary stock-decreasing writes.
    pub low_stock: u32,
    /// Threshold used by the bulk stock-update path.
    pub batch_low_stock: u32,
}

impl Default for StockThresholds {
    fn default() -> Self { Self { low_stock: 5, batch_low_stock: 10 } }
}

pub struct InventoryService<S> {
    store: Arc<S>,
    emitter: NotificationEmitter<S>,
    thresholds: StockThresholds,
}

impl<S> Clone for InventoryService<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), emitter: self.emitter.clone(), thresholds: self.thresholds }
    }
}

impl<S: Store> InventoryService<S> {
    pub fn new(store: Arc<S>, thresholds: StockThresholds) -> Self {
        Self { emitter: NotificationEmitter::new(store.clone()), store, thresholds }
    }

    pub fn thresholds(&self) -> StockThresholds { self.thresholds }

    pub fn store(&self) -> &Arc<S> { &self.store }
}
