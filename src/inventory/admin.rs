//! Admin stock edits, the bulk update path and batch reconciliation.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{AlertSubject, InventoryService};
use crate::domain::aggregates::StockStatus;
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::store::Store;
use crate::{InventoryError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub product_id: String,
    pub variant_id: String,
    pub previous: u32,
    pub stock: u32,
    pub stock_status: StockStatus,
}

impl StockAdjustment {
    pub fn event(&self) -> DomainEvent {
        DomainEvent::Inventory(InventoryEvent::StockAdjusted {
            product_id: self.product_id.clone(), variant_id: self.variant_id.clone(),
            previous: self.previous, stock: self.stock, stock_status: self.stock_status,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdate {
    pub product_id: String,
    pub variant_id: String,
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkLineResult {
    pub product_id: String,
    pub variant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<StockAdjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockEntry {
    pub product_id: String,
    pub product_name: String,
    pub variant_id: String,
    pub sku: String,
    pub stock: u32,
    pub stock_status: StockStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub updated_count: u64,
    pub scanned_count: u64,
}

impl<S: Store> InventoryService<S> {
    /// Overwrites a variant's stock as an admin edit and alerts on decreases.
    pub async fn set_variant_stock(&self, product_id: &str, variant_id: &str, stock: i64) -> Result<StockAdjustment> {
        self.apply_stock(product_id, variant_id, stock, self.thresholds.low_stock).await
    }

    /// The batch status-update path. Lines are applied independently; a bad
    /// line is reported and the rest still go through.
    #[instrument(skip(self, updates), fields(lines = updates.len()))]
    pub async fn bulk_update_stock(&self, updates: &[StockUpdate]) -> Vec<BulkLineResult> {
        let mut results = Vec::with_capacity(updates.len());
        for u in updates {
            let outcome = self.apply_stock(&u.product_id, &u.variant_id, u.stock, self.thresholds.batch_low_stock).await;
            if let Err(e) = &outcome {
                warn!(product_id = %u.product_id, variant_id = %u.variant_id, error = %e, "bulk stock line failed");
            }
            let (adjustment, error) = match outcome { Ok(a) => (Some(a), None), Err(e) => (None, Some(e.to_string())) };
            results.push(BulkLineResult { product_id: u.product_id.clone(), variant_id: u.variant_id.clone(), adjustment, error });
        }
        results
    }

    async fn apply_stock(&self, product_id: &str, variant_id: &str, stock: i64, threshold: u32) -> Result<StockAdjustment> {
        let stock = u32::try_from(stock).map_err(|_| InventoryError::InvalidQuantity(stock))?;
        let product = self.store.product(product_id).await?
            .ok_or_else(|| InventoryError::NotFound(format!("product {product_id}")))?;
        let variant = product.variant(variant_id)
            .ok_or_else(|| InventoryError::NotFound(format!("variant {variant_id}")))?;

        let stock_status = variant.status_after_stock_set(stock);
        let previous = self.store.set_stock(product_id, variant_id, stock, stock_status).await?
            .ok_or_else(|| InventoryError::NotFound(format!("variant {variant_id}")))?;
        info!(product_id, variant_id, previous, stock, %stock_status, "stock set");

        if stock < previous {
            self.emitter.on_stock_level(AlertSubject::of(&product, variant), stock, threshold).await;
        }
        Ok(StockAdjustment { product_id: product_id.to_string(), variant_id: variant_id.to_string(), previous, stock, stock_status })
    }

    /// Active variants at or below `threshold`, lowest stock first.
    pub async fn low_stock_report(&self, threshold: u32) -> Result<Vec<LowStockEntry>> {
        let mut entries: Vec<LowStockEntry> = self.store.products().await?.into_iter()
            .flat_map(|p| {
                let (product_id, product_name) = (p.id, p.name);
                p.variants.into_iter()
                    .filter(|v| v.is_active && v.stock <= threshold)
                    .map(move |v| LowStockEntry {
                        product_id: product_id.clone(), product_name: product_name.clone(), variant_id: v.id,
                        sku: v.sku.to_string(), stock: v.stock, stock_status: v.stock_status,
                    })
            })
            .collect();
        entries.sort_by_key(|e| e.stock);
        Ok(entries)
    }

    /// `syncAllStockStatuses`: rewrites every derived status that disagrees with its stock.
    ///
    /// The scan only picks candidates. Each fix is re-derived by the store from
    /// the stock it holds at write time, so a reservation landing mid-scan is
    /// never overwritten with a stale status.
    #[instrument(skip(self))]
    pub async fn sync_all_stock_statuses(&self) -> Result<SyncReport> {
        let mut report = SyncReport { updated_count: 0, scanned_count: 0 };
        for product in self.store.products().await? {
            for variant in &product.variants {
                report.scanned_count += 1;
                if variant.status_correction().is_none() { continue; }
                if let Some(level) = self.store.reconcile_stock_status(&product.id, &variant.id).await? {
                    info!(product_id = %product.id, variant_id = %variant.id, stock = level.stock, from = %variant.stock_status, to = %level.stock_status, "reconciled stock status");
                    report.updated_count += 1;
                }
            }
        }
        info!(updated = report.updated_count, scanned = report.scanned_count, "stock status sync finished");
        Ok(report)
    }
}
