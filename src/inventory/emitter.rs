//! Notification Emitter: turns a post-write stock level into a deduplicated alert.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::aggregates::{AlertMetadata, Notification, NotificationKind, Product, Variant};
use crate::store::{AlertUpsert, NotificationStore};

/// The variant an alert is about.
#[derive(Debug, Clone, Copy)]
pub struct AlertSubject<'a> {
    pub product_id: &'a str,
    pub product_name: &'a str,
    pub variant_id: &'a str,
    pub sku: &'a str,
}

impl<'a> AlertSubject<'a> {
    pub fn of(product: &'a Product, variant: &'a Variant) -> Self {
        Self { product_id: &product.id, product_name: &product.name, variant_id: &variant.id, sku: variant.sku.as_str() }
    }
}

pub struct NotificationEmitter<N> {
    store: Arc<N>,
}

impl<N> Clone for NotificationEmitter<N> {
    fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<N: NotificationStore> NotificationEmitter<N> {
    pub fn new(store: Arc<N>) -> Self { Self { store } }

    /// Reacts to a stock level reached by a stock-decreasing write.
    ///
    /// Zero raises `out_of_stock`; `1..=threshold` raises `low_stock`. An open
    /// alert for the same (kind, product, variant) is refreshed in place.
    /// Failures are logged and swallowed: they never fail the stock write.
    pub async fn on_stock_level(&self, subject: AlertSubject<'_>, stock: u32, threshold: u32) -> Option<AlertUpsert> {
        let alert = Self::alert_for(subject, stock, threshold)?;
        let AlertSubject { product_id, variant_id, .. } = subject;
        match self.store.upsert_open_alert(alert).await {
            Ok(outcome) => {
                let (verb, n) = match &outcome { AlertUpsert::Created(n) => ("created", n), AlertUpsert::Updated(n) => ("updated", n) };
                debug!(notification_id = %n.id, kind = %n.kind, product_id, variant_id, stock, "stock alert {verb}");
                Some(outcome)
            }
            Err(e) => {
                warn!(product_id, variant_id, stock, error = %e, "failed to record stock alert");
                None
            }
        }
    }

    fn alert_for(subject: AlertSubject<'_>, stock: u32, threshold: u32) -> Option<Notification> {
        let label = format!("{} ({})", subject.product_name, subject.sku);
        let (kind, title, message) = match stock {
            0 => (NotificationKind::OutOfStock, "Out of stock", format!("{label} is out of stock")),
            s if s <= threshold => (NotificationKind::LowStock, "Low stock", format!("{label} is running low: {s} left")),
            _ => return None,
        };
        let metadata = AlertMetadata {
            stock_level: Some(stock),
            threshold: Some(threshold),
            sku: Some(subject.sku.to_string()),
            product_name: Some(subject.product_name.to_string()),
            triggered_at: Some(Utc::now()),
        };
        Some(Notification::stock_alert(kind, subject.product_id, subject.variant_id, title, message, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::NotificationFilter;
    use crate::domain::value_objects::{Money, Sku};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn product() -> Product {
        Product::create("Kundan choker", vec![Variant::new(Sku::new("KC-1").unwrap(), "Gold", Money::inr(Decimal::new(15000, 0)), 1)])
    }

    #[tokio::test]
    async fn test_repeated_out_of_stock_is_deduplicated() {
        let store = Arc::new(MemoryStore::new());
        let emitter = NotificationEmitter::new(store.clone());
        let p = product();
        let v = &p.variants[0];
        assert!(matches!(emitter.on_stock_level(AlertSubject::of(&p, v), 0, 5).await, Some(AlertUpsert::Created(_))));
        assert!(matches!(emitter.on_stock_level(AlertSubject::of(&p, v), 0, 5).await, Some(AlertUpsert::Updated(_))));
        let open = store.notifications(&NotificationFilter { kind: Some(NotificationKind::OutOfStock), action_taken: Some(false), ..Default::default() }).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].metadata.stock_level, Some(0));
    }

    #[tokio::test]
    async fn test_thresholds() {
        let store = Arc::new(MemoryStore::new());
        let emitter = NotificationEmitter::new(store.clone());
        let p = product();
        let v = &p.variants[0];
        assert!(emitter.on_stock_level(AlertSubject::of(&p, v), 6, 5).await.is_none());
        match emitter.on_stock_level(AlertSubject::of(&p, v), 5, 5).await {
            Some(AlertUpsert::Created(n)) => assert_eq!(n.kind, NotificationKind::LowStock),
            other => panic!("unexpected {other:?}"),
        }
        assert!(emitter.on_stock_level(AlertSubject::of(&p, v), 8, 10).await.is_some());
    }

    #[tokio::test]
    async fn test_resolved_alert_is_not_reopened() {
        let store = Arc::new(MemoryStore::new());
        let emitter = NotificationEmitter::new(store.clone());
        let p = product();
        let v = &p.variants[0];
        let Some(AlertUpsert::Created(mut first)) = emitter.on_stock_level(AlertSubject::of(&p, v), 2, 5).await else { panic!("expected a new alert") };
        first.mark_action_taken();
        store.save_notification(&first).await.unwrap();
        let Some(AlertUpsert::Created(second)) = emitter.on_stock_level(AlertSubject::of(&p, v), 1, 5).await else { panic!("expected a fresh alert") };
        assert_ne!(first.id, second.id);
        let all = store.notifications(&NotificationFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|n| n.id == first.id && n.action_taken));
    }
}
