//! Availability Validator: the read-only gate in front of cart mutation and checkout.

use serde::Serialize;
use tracing::instrument;

use super::{InventoryService, StockCode, StockRequestItem, StockView};
use crate::domain::value_objects::Quantity;
use crate::store::Store;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueReason {
    NotFound,
    Unavailable,
    InsufficientStock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockIssue {
    /// Position of the offending item in the request.
    pub index: usize,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub variant_sku: Option<String>,
    pub requested: u32,
    /// What can actually be sold right now.
    pub available: u32,
    pub reason: IssueReason,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub is_valid: bool,
    pub issues: Vec<StockIssue>,
    pub stock_info: Vec<StockView>,
}

impl AvailabilityReport {
    /// The first shortfall as a typed error, if any.
    pub fn first_error(&self) -> Option<crate::InventoryError> {
        self.issues.first().map(|issue| match issue.reason {
            IssueReason::NotFound => crate::InventoryError::NotFound(
                issue.variant_id.clone().or_else(|| issue.variant_sku.clone()).or_else(|| issue.product_id.clone()).unwrap_or_default(),
            ),
            _ => crate::InventoryError::InsufficientStock { requested: issue.requested, available: issue.available },
        })
    }
}

fn check(index: usize, requested: u32, view: &StockView) -> Option<StockIssue> {
    let (reason, available, message) = if view.status == StockCode::NotFound {
        (IssueReason::NotFound, 0, view.message.clone())
    } else if !view.available {
        (IssueReason::Unavailable, 0, view.message.clone())
    } else if view.stock < requested {
        (IssueReason::InsufficientStock, view.stock, format!("Insufficient stock. Available {}", view.stock))
    } else {
        return None;
    };
    Some(StockIssue {
        index, product_id: view.product_id.clone(), variant_id: view.variant_id.clone(), variant_sku: view.variant_sku.clone(),
        requested, available, reason, message,
    })
}

impl<S: Store> InventoryService<S> {
    /// `validateStockAvailability`: resolves every item once and reports every shortfall.
    ///
    /// Quantities are checked up front; a non-positive one fails the whole call
    /// with `InvalidQuantity` before anything is resolved.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn validate_stock_availability(&self, items: &[StockRequestItem]) -> Result<AvailabilityReport> {
        let quantities = items.iter().map(|i| Quantity::new(i.quantity).map(|q| q.value())).collect::<std::result::Result<Vec<_>, _>>()?;

        let mut issues = Vec::new();
        let mut stock_info = Vec::with_capacity(items.len());
        for (index, (item, requested)) in items.iter().zip(quantities).enumerate() {
            let view = self.get_variant_stock(&item.target).await?;
            issues.extend(check(index, requested, &view));
            stock_info.push(view);
        }
        Ok(AvailabilityReport { is_valid: issues.is_empty(), issues, stock_info })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Product, Variant};
    use crate::domain::value_objects::{Money, Sku};
    use crate::inventory::{StockQuery, StockThresholds};
    use crate::store::MemoryStore;
    use crate::InventoryError;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    async fn setup() -> (InventoryService<MemoryStore>, String, String) {
        let p = Product::create("Pearl set", vec![
            Variant::new(Sku::new("PS-1").unwrap(), "Small", Money::inr(Decimal::new(900, 0)), 3),
            Variant::new(Sku::new("PS-2").unwrap(), "Large", Money::inr(Decimal::new(1200, 0)), 0),
        ]);
        let (a, b) = (p.variants[0].id.clone(), p.variants[1].id.clone());
        let store = MemoryStore::with_products([p]).await;
        (InventoryService::new(Arc::new(store), StockThresholds::default()), a, b)
    }

    #[tokio::test]
    async fn test_all_items_satisfiable() {
        let (svc, a, _) = setup().await;
        let report = svc.validate_stock_availability(&[StockRequestItem::new(StockQuery::by_variant(&a), 3)]).await.unwrap();
        assert!(report.is_valid);
        assert!(report.issues.is_empty());
        assert_eq!(report.stock_info.len(), 1);
    }

    #[tokio::test]
    async fn test_reports_every_issue() {
        let (svc, a, b) = setup().await;
        let report = svc.validate_stock_availability(&[
            StockRequestItem::new(StockQuery::by_variant(&a), 5),
            StockRequestItem::new(StockQuery::by_variant(&b), 1),
            StockRequestItem::new(StockQuery::by_sku("NOPE"), 1),
        ]).await.unwrap();
        assert!(!report.is_valid);
        let reasons: Vec<_> = report.issues.iter().map(|i| (i.index, i.reason)).collect();
        assert_eq!(reasons, vec![(0, IssueReason::InsufficientStock), (1, IssueReason::Unavailable), (2, IssueReason::NotFound)]);
        assert_eq!(report.issues[0].available, 3);
        assert_eq!(report.issues[0].message, "Insufficient stock. Available 3");
        assert!(matches!(report.first_error(), Some(InventoryError::InsufficientStock { requested: 5, available: 3 })));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_quantity() {
        let (svc, a, _) = setup().await;
        let err = svc.validate_stock_availability(&[StockRequestItem::new(StockQuery::by_variant(&a), 0)]).await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity(0)));
    }
}
