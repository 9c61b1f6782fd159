//! Stock Resolver.
//!
//! Finds a variant by id, SKU or product id and returns a normalized,
//! status-corrected view of its stock. SKUs are not unique across products,
//! so a SKU lookup prefers a candidate that still has stock and reports the
//! ambiguity instead of hiding it.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::{InventoryService, StockQuery};
use crate::domain::aggregates::{Product, StockStatus, Variant};
use crate::store::Store;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockCode {
    Available,
    OutOfStock,
    Insufficient,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRef {
    pub product_id: String,
    pub variant_id: String,
    pub stock: u32,
}

/// How the variant was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    /// Several variants share the SKU; one was picked among `candidates`.
    AmbiguousResolved { candidates: Vec<VariantRef> },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockView {
    pub status: StockCode,
    pub stock: u32,
    pub stock_status: Option<StockStatus>,
    pub available: bool,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub variant_sku: Option<String>,
    pub message: String,
    pub resolution: Resolution,
}

impl StockView {
    fn not_found(query: &StockQuery) -> Self {
        Self {
            status: StockCode::NotFound, stock: 0, stock_status: None, available: false,
            product_id: query.product_id.clone(), variant_id: query.variant_id.clone(), variant_sku: query.variant_sku.clone(),
            message: "Variant not found".to_string(), resolution: Resolution::NotFound,
        }
    }

    fn of(product: &Product, variant: &Variant, resolution: Resolution) -> Self {
        let available = variant.is_available();
        let (status, message) = if available {
            (StockCode::Available, "In stock")
        } else if variant.stock == 0 {
            (StockCode::OutOfStock, "Out of stock")
        } else {
            (StockCode::Insufficient, "Variant is not available")
        };
        Self {
            status, stock: variant.stock, stock_status: Some(variant.stock_status), available,
            product_id: Some(product.id.clone()), variant_id: Some(variant.id.clone()),
            variant_sku: Some(variant.sku.to_string()), message: message.to_string(), resolution,
        }
    }

    pub fn is_found(&self) -> bool { self.status != StockCode::NotFound }
}

/// A resolved variant together with its owning product.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub product: Product,
    pub variant: Variant,
    pub view: StockView,
}

impl<S: Store> InventoryService<S> {
    /// `getVariantStock`: the normalized stock view for whatever keys are given.
    #[instrument(skip(self), fields(query = %query.describe()))]
    pub async fn get_variant_stock(&self, query: &StockQuery) -> Result<StockView> {
        Ok(match self.resolve(query).await? {
            Some(resolved) => resolved.view,
            None => StockView::not_found(query),
        })
    }

    /// Locates the variant, heals a contradictory status, and builds its view.
    pub(crate) async fn resolve(&self, query: &StockQuery) -> Result<Option<Resolved>> {
        let Some((product, mut variant, resolution)) = self.locate(query).await? else {
            debug!("no variant matched");
            return Ok(None);
        };
        self.heal_status(&product.id, &mut variant).await;
        let view = StockView::of(&product, &variant, resolution);
        Ok(Some(Resolved { product, variant, view }))
    }

    async fn locate(&self, query: &StockQuery) -> Result<Option<(Product, Variant, Resolution)>> {
        if let Some(variant_id) = query.variant_id.as_deref() {
            if let Some(product) = self.store.product_by_variant_id(variant_id).await? {
                if let Some(variant) = product.variant(variant_id).cloned() {
                    return Ok(Some((product, variant, Resolution::Resolved)));
                }
            }
        }

        if let Some(sku) = query.variant_sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let products = self.store.products_by_variant_sku(sku).await?;
            let candidates: Vec<(&Product, &Variant)> = products.iter()
                .flat_map(|p| p.variants.iter().filter(|v| v.sku.as_str() == sku).map(move |v| (p, v)))
                .collect();
            let picked = candidates.iter().find(|(_, v)| v.stock > 0).or_else(|| candidates.first());
            if let Some((product, variant)) = picked {
                let resolution = if candidates.len() > 1 {
                    let refs: Vec<VariantRef> = candidates.iter()
                        .map(|(p, v)| VariantRef { product_id: p.id.clone(), variant_id: v.id.clone(), stock: v.stock })
                        .collect();
                    warn!(sku, candidates = refs.len(), product_id = %product.id, variant_id = %variant.id, "SKU matches several variants; picked one");
                    Resolution::AmbiguousResolved { candidates: refs }
                } else {
                    Resolution::Resolved
                };
                return Ok(Some(((*product).clone(), (*variant).clone(), resolution)));
            }
        }

        // A product id only stands in for a variant when no variant key was given.
        if query.variant_id.is_some() || query.variant_sku.as_deref().is_some_and(|s| !s.trim().is_empty()) {
            return Ok(None);
        }
        if let Some(product_id) = query.product_id.as_deref() {
            if let Some(product) = self.store.product(product_id).await? {
                if let Some(variant) = product.default_variant().cloned() {
                    return Ok(Some((product, variant, Resolution::Resolved)));
                }
            }
        }

        Ok(None)
    }

    /// Corrects a status that contradicts stock. The store re-derives it from
    /// the stock it holds at write time, and the view takes whatever was
    /// written. The write is best-effort: on failure the locally corrected
    /// value is still returned to the caller.
    async fn heal_status(&self, product_id: &str, variant: &mut Variant) {
        let Some(fixed) = variant.status_correction() else { return };
        let stale = std::mem::replace(&mut variant.stock_status, fixed);
        match self.store.reconcile_stock_status(product_id, &variant.id).await {
            Ok(Some(level)) => {
                variant.stock = level.stock;
                variant.stock_status = level.stock_status;
                info!(product_id, variant_id = %variant.id, stock = level.stock, from = %stale, to = %level.stock_status, "healed stock status");
            }
            Ok(None) => debug!(product_id, variant_id = %variant.id, "stock status already settled"),
            Err(e) => warn!(product_id, variant_id = %variant.id, error = %e, "failed to persist healed stock status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Money, Sku};
    use crate::inventory::StockThresholds;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn variant(sku: &str, stock: u32) -> Variant {
        Variant::new(Sku::new(sku).unwrap(), "30ml", Money::inr(Decimal::new(2500, 0)), stock)
    }

    async fn service(products: Vec<Product>) -> (InventoryService<MemoryStore>, MemoryStore) {
        let store = MemoryStore::with_products(products).await;
        (InventoryService::new(Arc::new(store.clone()), StockThresholds::default()), store)
    }

    #[tokio::test]
    async fn test_resolves_by_variant_id() {
        let p = Product::create("Jasmine", vec![variant("J-1", 3)]);
        let vid = p.variants[0].id.clone();
        let (svc, _) = service(vec![p]).await;
        let view = svc.get_variant_stock(&StockQuery::by_variant(&vid)).await.unwrap();
        assert_eq!(view.status, StockCode::Available);
        assert_eq!(view.stock, 3);
        assert!(view.available);
        assert_eq!(view.resolution, Resolution::Resolved);
    }

    #[tokio::test]
    async fn test_duplicate_sku_prefers_stocked_variant() {
        let empty = Product::create("Old listing", vec![variant("DUP", 0)]);
        let stocked = Product::create("New listing", vec![variant("DUP", 7)]);
        let stocked_vid = stocked.variants[0].id.clone();
        let (svc, _) = service(vec![empty, stocked]).await;
        let view = svc.get_variant_stock(&StockQuery::by_sku("DUP")).await.unwrap();
        assert_eq!(view.variant_id.as_deref(), Some(stocked_vid.as_str()));
        assert_eq!(view.stock, 7);
        match view.resolution {
            Resolution::AmbiguousResolved { candidates } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_sku_without_stock_falls_back_to_first() {
        let first = Product::create("A", vec![variant("DUP", 0)]);
        let first_vid = first.variants[0].id.clone();
        let second = Product::create("B", vec![variant("DUP", 0)]);
        let (svc, _) = service(vec![first, second]).await;
        let view = svc.get_variant_stock(&StockQuery::by_sku("DUP")).await.unwrap();
        assert_eq!(view.variant_id.as_deref(), Some(first_vid.as_str()));
        assert_eq!(view.status, StockCode::OutOfStock);
    }

    #[tokio::test]
    async fn test_product_id_uses_default_variant() {
        let p = Product::create("Ring", vec![variant("R-6", 1), variant("R-7", 2).as_default()]);
        let pid = p.id.clone();
        let (svc, _) = service(vec![p]).await;
        let view = svc.get_variant_stock(&StockQuery::by_product(&pid)).await.unwrap();
        assert_eq!(view.variant_sku.as_deref(), Some("R-7"));
    }

    #[tokio::test]
    async fn test_unknown_keys_are_not_found() {
        let (svc, _) = service(vec![]).await;
        let view = svc.get_variant_stock(&StockQuery::by_variant("missing")).await.unwrap();
        assert_eq!(view.status, StockCode::NotFound);
        assert!(!view.available);
        let view = svc.get_variant_stock(&StockQuery::default()).await.unwrap();
        assert_eq!(view.resolution, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_heals_contradictory_status() {
        let mut v = variant("H-1", 4);
        v.stock_status = StockStatus::OutOfStock;
        let p = Product::create("Bangle", vec![v]);
        let (pid, vid) = (p.id.clone(), p.variants[0].id.clone());
        let (svc, store) = service(vec![p]).await;
        let view = svc.get_variant_stock(&StockQuery::by_variant(&vid)).await.unwrap();
        assert_eq!(view.stock_status, Some(StockStatus::InStock));
        assert!(view.available);
        assert_eq!(store.stock_of(&pid, &vid).await, Some((4, StockStatus::InStock)));
    }

    #[tokio::test]
    async fn test_missing_variant_id_is_not_replaced_by_default_variant() {
        let p = Product::create("Earrings", vec![variant("E-1", 0), variant("E-2", 9).as_default()]);
        let pid = p.id.clone();
        let (svc, _) = service(vec![p]).await;
        let query = StockQuery { variant_id: Some("deleted-variant".into()), product_id: Some(pid), ..Default::default() };
        let view = svc.get_variant_stock(&query).await.unwrap();
        assert_eq!(view.status, StockCode::NotFound);
        assert_eq!(view.variant_sku, None);

        let report = svc.validate_stock_availability(&[crate::inventory::StockRequestItem::new(query, 5)]).await.unwrap();
        assert!(!report.is_valid);
    }

    #[tokio::test]
    async fn test_heal_keeps_a_status_written_by_a_reservation() {
        let mut v = variant("H-2", 0);
        v.stock_status = StockStatus::InStock;
        let p = Product::create("Kada", vec![v]);
        let (pid, vid) = (p.id.clone(), p.variants[0].id.clone());
        let (svc, store) = service(vec![p]).await;
        svc.get_variant_stock(&StockQuery::by_variant(&vid)).await.unwrap();
        assert_eq!(store.stock_of(&pid, &vid).await, Some((0, StockStatus::OutOfStock)));
        let view = svc.get_variant_stock(&StockQuery::by_variant(&vid)).await.unwrap();
        assert_eq!(view.stock_status, Some(StockStatus::OutOfStock));
        assert!(!view.available);
    }

    #[tokio::test]
    async fn test_inactive_variant_with_stock_is_insufficient() {
        let p = Product::create("Anklet", vec![variant("A-1", 5).inactive()]);
        let vid = p.variants[0].id.clone();
        let (svc, _) = service(vec![p]).await;
        let view = svc.get_variant_stock(&StockQuery::by_variant(&vid)).await.unwrap();
        assert_eq!(view.status, StockCode::Insufficient);
        assert!(!view.available);
    }
}
