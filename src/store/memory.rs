//! In-memory store (demos and tests).
//!
//! Stock writes happen under the state lock, so each conditional decrement is
//! atomic with respect to every other writer. A transaction applies its stock
//! writes immediately and keeps an undo log; rollback replays it in reverse.
//! New orders only become visible on commit; a status transition claims the
//! stored order at once so a racing transition sees it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AlertUpsert, CartStore, CatalogStore, NotificationStore, StockLevel, StockTransaction, StoreResult};
use crate::domain::aggregates::{Cart, Notification, NotificationFilter, Order, OrderStatus, Product, StockStatus, Variant};

#[derive(Debug, Default)]
struct MemoryState {
    products: Vec<Product>,
    carts: HashMap<String, Cart>,
    orders: HashMap<String, Order>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    fn variant_mut(&mut self, product_id: &str, variant_id: &str) -> Option<&mut Variant> {
        self.products.iter_mut().find(|p| p.id == product_id).and_then(|p| p.variant_mut(variant_id))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Seeds the catalog.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        store.state.write().await.products.extend(products);
        store
    }

    /// Current (stock, status) of a variant, for assertions and diagnostics.
    pub async fn stock_of(&self, product_id: &str, variant_id: &str) -> Option<(u32, StockStatus)> {
        let state = self.state.read().await;
        state.products.iter().find(|p| p.id == product_id)
            .and_then(|p| p.variant(variant_id))
            .map(|v| (v.stock, v.stock_status))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx { state: self.state.clone(), undo: vec![], orders: vec![], done: false })
    }

    async fn product(&self, product_id: &str) -> StoreResult<Option<Product>> {
        Ok(self.state.read().await.products.iter().find(|p| p.id == product_id).cloned())
    }

    async fn product_by_variant_id(&self, variant_id: &str) -> StoreResult<Option<Product>> {
        Ok(self.state.read().await.products.iter().find(|p| p.variant(variant_id).is_some()).cloned())
    }

    async fn products_by_variant_sku(&self, sku: &str) -> StoreResult<Vec<Product>> {
        Ok(self.state.read().await.products.iter().filter(|p| p.variant_by_sku(sku).is_some()).cloned().collect())
    }

    async fn products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.state.read().await.products.clone())
    }

    async fn save_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state.products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => state.products.push(product.clone()),
        }
        Ok(())
    }

    async fn reconcile_stock_status(&self, product_id: &str, variant_id: &str) -> StoreResult<Option<StockLevel>> {
        let mut state = self.state.write().await;
        let Some(v) = state.variant_mut(product_id, variant_id) else { return Ok(None) };
        Ok(v.status_correction().map(|fixed| {
            v.stock_status = fixed;
            StockLevel { stock: v.stock, stock_status: fixed }
        }))
    }

    async fn set_stock(&self, product_id: &str, variant_id: &str, stock: u32, status: StockStatus) -> StoreResult<Option<u32>> {
        let mut state = self.state.write().await;
        Ok(state.variant_mut(product_id, variant_id).map(|v| {
            let previous = v.stock;
            v.stock = stock;
            v.stock_status = status;
            previous
        }))
    }

    async fn order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(order_id).cloned())
    }
}

#[derive(Debug)]
enum Undo {
    Stock { product_id: String, variant_id: String, delta: i64, prior_status: StockStatus },
    Order(Order),
}

fn replay_undo(state: &mut MemoryState, undo: Vec<Undo>) {
    for entry in undo.into_iter().rev() {
        match entry {
            Undo::Stock { product_id, variant_id, delta, prior_status } => {
                if let Some(v) = state.variant_mut(&product_id, &variant_id) {
                    let restored = i64::from(v.stock) - delta;
                    v.stock = u32::try_from(restored.max(0)).unwrap_or(u32::MAX);
                    v.stock_status = prior_status;
                    // Other writers may have moved stock meanwhile; settle the derived pair.
                    if let Some(fixed) = v.status_correction() { v.stock_status = fixed; }
                }
            }
            Undo::Order(prior) => { state.orders.insert(prior.id().to_string(), prior); }
        }
    }
}

#[derive(Debug)]
pub struct MemoryTx {
    state: Arc<RwLock<MemoryState>>,
    undo: Vec<Undo>,
    orders: Vec<Order>,
    done: bool,
}

#[async_trait]
impl StockTransaction for MemoryTx {
    async fn decrement_stock(&mut self, product_id: &str, variant_id: &str, quantity: u32) -> StoreResult<Option<StockLevel>> {
        let mut state = self.state.write().await;
        let Some(v) = state.variant_mut(product_id, variant_id) else { return Ok(None) };
        if v.stock < quantity { return Ok(None); }
        let prior_status = v.stock_status;
        v.stock -= quantity;
        v.stock_status = v.status_after_stock_set(v.stock);
        let level = StockLevel { stock: v.stock, stock_status: v.stock_status };
        self.undo.push(Undo::Stock { product_id: product_id.into(), variant_id: variant_id.into(), delta: -i64::from(quantity), prior_status });
        Ok(Some(level))
    }

    async fn increment_stock(&mut self, product_id: &str, variant_id: &str, quantity: u32) -> StoreResult<Option<StockLevel>> {
        let mut state = self.state.write().await;
        let Some(v) = state.variant_mut(product_id, variant_id) else { return Ok(None) };
        let prior_status = std::mem::replace(&mut v.stock_status, StockStatus::InStock);
        v.stock = v.stock.saturating_add(quantity);
        let level = StockLevel { stock: v.stock, stock_status: v.stock_status };
        self.undo.push(Undo::Stock { product_id: product_id.into(), variant_id: variant_id.into(), delta: i64::from(quantity), prior_status });
        Ok(Some(level))
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        self.orders.retain(|o| o.id() != order.id());
        self.orders.push(order.clone());
        Ok(())
    }

    async fn transition_order(&mut self, order: &Order, expected: OrderStatus) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(stored) = state.orders.get_mut(order.id()) else { return Ok(false) };
        if stored.status() != expected { return Ok(false); }
        let prior = std::mem::replace(stored, order.clone());
        self.undo.push(Undo::Order(prior));
        Ok(true)
    }

    async fn commit(mut self) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for order in std::mem::take(&mut self.orders) {
            state.orders.insert(order.id().to_string(), order);
        }
        self.undo.clear();
        self.done = true;
        Ok(())
    }

    async fn rollback(mut self) -> StoreResult<()> {
        let undo = std::mem::take(&mut self.undo);
        replay_undo(&mut *self.state.write().await, undo);
        self.done = true;
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.done || self.undo.is_empty() { return; }
        let undo = std::mem::take(&mut self.undo);
        match self.state.try_write() {
            Ok(mut state) => replay_undo(&mut state, undo),
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let state = self.state.clone();
                    handle.spawn(async move { replay_undo(&mut *state.write().await, undo) });
                }
                Err(_) => tracing::error!(entries = undo.len(), "dropped transaction could not be rolled back"),
            },
        }
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart(&self, user_id: &str) -> StoreResult<Option<Cart>> {
        Ok(self.state.read().await.carts.get(user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        self.state.write().await.carts.insert(cart.user_id().to_string(), cart.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn upsert_open_alert(&self, alert: Notification) -> StoreResult<AlertUpsert> {
        let mut state = self.state.write().await;
        let open = state.notifications.iter_mut().find(|n| {
            n.is_open() && n.kind == alert.kind && n.product_id == alert.product_id && n.variant_id == alert.variant_id
        });
        if let Some(existing) = open {
            existing.refresh_from(&alert);
            return Ok(AlertUpsert::Updated(existing.clone()));
        }
        state.notifications.push(alert.clone());
        Ok(AlertUpsert::Created(alert))
    }

    async fn notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        Ok(self.state.read().await.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn notifications(&self, filter: &NotificationFilter) -> StoreResult<Vec<Notification>> {
        let mut found: Vec<Notification> = self.state.read().await.notifications.iter().filter(|n| filter.matches(n)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn save_notification(&self, notification: &Notification) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state.notifications.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => *existing = notification.clone(),
            None => state.notifications.push(notification.clone()),
        }
        Ok(())
    }

    async fn count_unread(&self) -> StoreResult<u64> {
        Ok(self.state.read().await.notifications.iter().filter(|n| !n.is_read).count() as u64)
    }

    async fn mark_all_read(&self) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for n in state.notifications.iter_mut().filter(|n| !n.is_read) {
            n.mark_read();
            changed += 1;
        }
        Ok(changed)
    }
}
