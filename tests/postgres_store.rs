//! PgStore against a live database.
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/storefront cargo test --features postgres-tests --test postgres_store
//! ```

#![cfg(feature = "postgres-tests")]

use rust_decimal::Decimal;
use sqlx::PgPool;

use storefront_inventory::domain::aggregates::{
    AlertMetadata, LineItem, Notification, NotificationKind, Order, OrderStatus, Product, StockStatus, Variant,
};
use storefront_inventory::domain::value_objects::{Money, Sku};
use storefront_inventory::store::{AlertUpsert, CatalogStore, NotificationStore, PgStore, StockLevel, StockTransaction};

async fn seeded(pool: PgPool, stock: u32, status: StockStatus) -> (PgStore, String, String) {
    let mut v = Variant::new(Sku::new("PG-1").unwrap(), "50ml", Money::inr(Decimal::new(1800, 0)), stock);
    v.stock_status = status;
    let p = Product::create("Oudh", vec![v]);
    let (pid, vid) = (p.id.clone(), p.variants[0].id.clone());
    let store = PgStore::new(pool);
    store.save_product(&p).await.unwrap();
    (store, pid, vid)
}

async fn stored_level(store: &PgStore, pid: &str, vid: &str) -> (u32, StockStatus) {
    let product = store.product(pid).await.unwrap().unwrap();
    let v = product.variant(vid).unwrap();
    (v.stock, v.stock_status)
}

#[sqlx::test]
async fn decrement_is_conditional_and_sets_status(pool: PgPool) {
    let (store, pid, vid) = seeded(pool, 2, StockStatus::InStock).await;
    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.decrement_stock(&pid, &vid, 3).await.unwrap(), None);
    assert_eq!(tx.decrement_stock(&pid, &vid, 2).await.unwrap(), Some(StockLevel { stock: 0, stock_status: StockStatus::OutOfStock }));
    tx.commit().await.unwrap();
    assert_eq!(stored_level(&store, &pid, &vid).await, (0, StockStatus::OutOfStock));
}

#[sqlx::test]
async fn decrement_keeps_override_until_empty(pool: PgPool) {
    let (store, pid, vid) = seeded(pool, 3, StockStatus::Preorder).await;
    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.decrement_stock(&pid, &vid, 1).await.unwrap().map(|l| l.stock_status), Some(StockStatus::Preorder));
    assert_eq!(tx.decrement_stock(&pid, &vid, 2).await.unwrap().map(|l| l.stock_status), Some(StockStatus::OutOfStock));
    tx.rollback().await.unwrap();
    assert_eq!(stored_level(&store, &pid, &vid).await, (3, StockStatus::Preorder));
}

#[sqlx::test]
async fn reconcile_derives_status_from_stored_stock(pool: PgPool) {
    let (store, pid, vid) = seeded(pool, 0, StockStatus::InStock).await;
    assert_eq!(
        store.reconcile_stock_status(&pid, &vid).await.unwrap(),
        Some(StockLevel { stock: 0, stock_status: StockStatus::OutOfStock })
    );
    assert_eq!(store.reconcile_stock_status(&pid, &vid).await.unwrap(), None);

    store.set_stock(&pid, &vid, 0, StockStatus::Backorder).await.unwrap();
    assert_eq!(store.reconcile_stock_status(&pid, &vid).await.unwrap(), None);
}

#[sqlx::test]
async fn open_alert_upsert_deduplicates(pool: PgPool) {
    let store = PgStore::new(pool);
    let alert = || Notification::stock_alert(NotificationKind::LowStock, "p1", "v1", "Low stock", "running low", AlertMetadata::default());

    let AlertUpsert::Created(first) = store.upsert_open_alert(alert()).await.unwrap() else { panic!("expected a new alert") };
    let AlertUpsert::Updated(again) = store.upsert_open_alert(alert()).await.unwrap() else { panic!("expected a refresh") };
    assert_eq!(first.id, again.id);
    assert_eq!(store.count_unread().await.unwrap(), 1);

    let mut resolved = again;
    resolved.mark_action_taken();
    store.save_notification(&resolved).await.unwrap();
    assert!(matches!(store.upsert_open_alert(alert()).await.unwrap(), AlertUpsert::Created(_)));
    assert_eq!(store.count_unread().await.unwrap(), 1);
}

#[sqlx::test]
async fn order_transition_is_compare_and_set(pool: PgPool) {
    let store = PgStore::new(pool);
    let mut order = Order::create("u1", "INR");
    order.add_item(LineItem {
        product_id: "p1".into(), variant_id: "v1".into(), sku: Sku::new("PG-1").unwrap(), name: "Oudh".into(),
        quantity: 1, unit_price: Money::inr(Decimal::new(1800, 0)), total: Money::inr(Decimal::new(1800, 0)),
    });
    order.confirm().unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.save_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    let mut cancelled = order.clone();
    cancelled.cancel().unwrap();
    let mut tx = store.begin().await.unwrap();
    assert!(tx.transition_order(&cancelled, OrderStatus::Confirmed).await.unwrap());
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(!tx.transition_order(&cancelled, OrderStatus::Confirmed).await.unwrap());
    tx.rollback().await.unwrap();
    assert_eq!(store.order(order.id()).await.unwrap().unwrap().status(), OrderStatus::Cancelled);
}
