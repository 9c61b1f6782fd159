//! Stock Reservation / Release Engine.
//!
//! Both operations run inside a caller-supplied transaction and have no commit
//! point of their own. A failed item returns an error immediately; the
//! caller must abort the transaction so earlier items in the same call are
//! undone with it. Stock alerts for a reservation are raised by
//! [`InventoryService::emit_stock_alerts`] once the caller has committed.

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{AlertSubject, InventoryService, StockRequestItem};
use crate::domain::aggregates::StockStatus;
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::domain::value_objects::Quantity;
use crate::store::{StockLevel, StockTransaction, Store};
use crate::{InventoryError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub product_id: String,
    pub product_name: String,
    pub variant_id: String,
    pub variant_sku: String,
    pub quantity: u32,
    pub previous_stock: u32,
    pub stock: u32,
    pub stock_status: StockStatus,
}

impl Reservation {
    pub fn alert_subject(&self) -> AlertSubject<'_> {
        AlertSubject { product_id: &self.product_id, product_name: &self.product_name, variant_id: &self.variant_id, sku: &self.variant_sku }
    }

    pub fn event(&self) -> DomainEvent {
        DomainEvent::Inventory(InventoryEvent::StockReserved {
            product_id: self.product_id.clone(), variant_id: self.variant_id.clone(),
            quantity: self.quantity, stock: self.stock, stock_status: self.stock_status,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationOutcome {
    pub success: bool,
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub product_id: String,
    pub variant_id: String,
    pub quantity: u32,
    pub stock: u32,
}

impl Release {
    pub fn event(&self) -> DomainEvent {
        DomainEvent::Inventory(InventoryEvent::StockReleased {
            product_id: self.product_id.clone(), variant_id: self.variant_id.clone(),
            quantity: self.quantity, stock: self.stock,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOutcome {
    pub success: bool,
    pub releases: Vec<Release>,
}

fn quantities(items: &[StockRequestItem]) -> Result<Vec<u32>> {
    items.iter().map(|i| Ok(Quantity::new(i.quantity)?.value())).collect()
}

impl<S: Store> InventoryService<S> {
    /// `reserveStock`: debits every item inside `tx`.
    ///
    /// The pre-read only shapes the error message; the debit itself is a
    /// conditional write that also recomputes the status, and it fails when a
    /// concurrent reservation got there first.
    #[instrument(skip(self, items, tx), fields(items = items.len()))]
    pub async fn reserve_stock(&self, items: &[StockRequestItem], tx: &mut S::Tx) -> Result<ReservationOutcome> {
        let quantities = quantities(items)?;
        let mut reservations = Vec::with_capacity(items.len());

        for (item, quantity) in items.iter().zip(quantities) {
            let resolved = self.resolve(&item.target).await?
                .ok_or_else(|| InventoryError::NotFound(item.target.describe()))?;
            let (product, variant) = (&resolved.product, &resolved.variant);

            if !resolved.view.available {
                return Err(InventoryError::InsufficientStock { requested: quantity, available: 0 });
            }
            if variant.stock < quantity {
                return Err(InventoryError::InsufficientStock { requested: quantity, available: variant.stock });
            }

            let Some(level) = tx.decrement_stock(&product.id, &variant.id, quantity).await? else {
                let available = self.get_variant_stock(&item.target).await.map(|v| v.stock).unwrap_or(0);
                warn!(product_id = %product.id, variant_id = %variant.id, quantity, available, "reservation lost the race for stock");
                return Err(InventoryError::InsufficientStock { requested: quantity, available });
            };

            let StockLevel { stock, stock_status } = level;
            info!(product_id = %product.id, variant_id = %variant.id, quantity, stock, "reserved stock");

            reservations.push(Reservation {
                product_id: product.id.clone(), product_name: product.name.clone(),
                variant_id: variant.id.clone(), variant_sku: variant.sku.to_string(),
                quantity, previous_stock: stock + quantity, stock, stock_status,
            });
        }

        Ok(ReservationOutcome { success: true, reservations })
    }

    /// Raises the low-stock and out-of-stock alerts for the levels a reservation
    /// reached. Call it after the reserving transaction has committed.
    pub async fn emit_stock_alerts(&self, outcome: &ReservationOutcome) {
        for r in &outcome.reservations {
            self.emitter.on_stock_level(r.alert_subject(), r.stock, self.thresholds.low_stock).await;
        }
    }

    /// `releaseStock`: credits every item inside `tx` and marks it in stock.
    ///
    /// Order lines carry a variant id, which is tried before any SKU, so the
    /// credit lands on the variant that was debited.
    #[instrument(skip(self, items, tx), fields(items = items.len()))]
    pub async fn release_stock(&self, items: &[StockRequestItem], tx: &mut S::Tx) -> Result<ReleaseOutcome> {
        let quantities = quantities(items)?;
        let mut releases = Vec::with_capacity(items.len());

        for (item, quantity) in items.iter().zip(quantities) {
            let resolved = self.resolve(&item.target).await?
                .ok_or_else(|| InventoryError::NotFound(item.target.describe()))?;
            let (product_id, variant_id) = (resolved.product.id, resolved.variant.id);

            let StockLevel { stock, .. } = tx.increment_stock(&product_id, &variant_id, quantity).await?
                .ok_or_else(|| InventoryError::NotFound(format!("variant {variant_id}")))?;
            info!(%product_id, %variant_id, quantity, stock, "released stock");

            releases.push(Release { product_id, variant_id, quantity, stock });
        }

        Ok(ReleaseOutcome { success: true, releases })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{NotificationFilter, NotificationKind, Product, Variant};
    use crate::domain::value_objects::{Money, Sku};
    use crate::inventory::{StockQuery, StockThresholds};
    use crate::store::{CatalogStore, MemoryStore, NotificationStore};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    async fn setup(stock: u32) -> (InventoryService<MemoryStore>, MemoryStore, String, String) {
        let p = Product::create("Amber", vec![Variant::new(Sku::new("AM-1").unwrap(), "100ml", Money::inr(Decimal::new(3200, 0)), stock)]);
        let (pid, vid) = (p.id.clone(), p.variants[0].id.clone());
        let store = MemoryStore::with_products([p]).await;
        (InventoryService::new(Arc::new(store.clone()), StockThresholds::default()), store, pid, vid)
    }

    fn items(vid: &str, quantity: i64) -> Vec<StockRequestItem> {
        vec![StockRequestItem::new(StockQuery::by_variant(vid), quantity)]
    }

    #[tokio::test]
    async fn test_reserve_within_stock() {
        let (svc, store, pid, vid) = setup(5).await;
        let mut tx = store.begin().await.unwrap();
        let outcome = svc.reserve_stock(&items(&vid, 3), &mut tx).await.unwrap();
        tx.commit().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.reservations[0].stock, 2);
        assert_eq!(outcome.reservations[0].previous_stock, 5);
        assert_eq!(store.stock_of(&pid, &vid).await, Some((2, StockStatus::InStock)));
    }

    #[tokio::test]
    async fn test_reserve_beyond_stock_fails_untouched() {
        let (svc, store, pid, vid) = setup(2).await;
        let mut tx = store.begin().await.unwrap();
        let err = svc.reserve_stock(&items(&vid, 3), &mut tx).await.unwrap_err();
        tx.rollback().await.unwrap();
        assert!(matches!(err, InventoryError::InsufficientStock { requested: 3, available: 2 }));
        assert_eq!(err.to_string(), "Insufficient stock. Available 2");
        assert_eq!(store.stock_of(&pid, &vid).await.unwrap().0, 2);
    }

    #[tokio::test]
    async fn test_last_unit_goes_out_of_stock_with_alert() {
        let (svc, store, pid, vid) = setup(1).await;
        let mut tx = store.begin().await.unwrap();
        let outcome = svc.reserve_stock(&items(&vid, 1), &mut tx).await.unwrap();
        assert!(store.notifications(&NotificationFilter::default()).await.unwrap().is_empty());
        tx.commit().await.unwrap();
        svc.emit_stock_alerts(&outcome).await;
        assert_eq!(store.stock_of(&pid, &vid).await, Some((0, StockStatus::OutOfStock)));
        let alerts = store.notifications(&NotificationFilter { kind: Some(NotificationKind::OutOfStock), ..Default::default() }).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].variant_id.as_deref(), Some(vid.as_str()));
        assert_eq!(alerts[0].metadata.product_name.as_deref(), Some("Amber"));
    }

    #[tokio::test]
    async fn test_reserve_then_release_round_trips() {
        let (svc, store, pid, vid) = setup(4).await;
        let mut tx = store.begin().await.unwrap();
        svc.reserve_stock(&items(&vid, 4), &mut tx).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.stock_of(&pid, &vid).await, Some((0, StockStatus::OutOfStock)));

        let mut tx = store.begin().await.unwrap();
        let outcome = svc.release_stock(&items(&vid, 4), &mut tx).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(outcome.releases[0].stock, 4);
        assert_eq!(store.stock_of(&pid, &vid).await, Some((4, StockStatus::InStock)));
    }

    #[tokio::test]
    async fn test_failed_line_aborts_earlier_lines() {
        let (svc, store, pid, vid) = setup(5).await;
        let mut tx = store.begin().await.unwrap();
        let mut lines = items(&vid, 2);
        lines.push(StockRequestItem::new(StockQuery::by_variant(&vid), 4));
        assert!(svc.reserve_stock(&lines, &mut tx).await.is_err());
        tx.rollback().await.unwrap();
        assert_eq!(store.stock_of(&pid, &vid).await, Some((5, StockStatus::InStock)));
        assert!(store.notifications(&NotificationFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_quantity_touches_nothing() {
        let (svc, store, pid, vid) = setup(5).await;
        let mut tx = store.begin().await.unwrap();
        let err = svc.reserve_stock(&items(&vid, -1), &mut tx).await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity(-1)));
        drop(tx);
        assert_eq!(store.stock_of(&pid, &vid).await.unwrap().0, 5);
    }

    #[tokio::test]
    async fn test_unknown_variant_is_not_found() {
        let (svc, store, _, _) = setup(5).await;
        let mut tx = store.begin().await.unwrap();
        let err = svc.reserve_stock(&items("ghost", 1), &mut tx).await.unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));
    }
}
