//! Storage seams for products, carts, orders and notifications.
//!
//! The product catalog is the only shared mutable resource in the stock core.
//! Mutual exclusion is delegated to the backend: every stock write is a single
//! conditional update, and writes that must land together go through a
//! [`StockTransaction`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::aggregates::{Cart, Notification, NotificationFilter, Order, OrderStatus, Product, StockStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Catalog and order persistence.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    type Tx: StockTransaction;

    /// Opens a multi-document transaction.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn product(&self, product_id: &str) -> StoreResult<Option<Product>>;

    /// The product embedding the variant with this id.
    async fn product_by_variant_id(&self, variant_id: &str) -> StoreResult<Option<Product>>;

    /// Every product embedding a variant with this SKU, in catalog order.
    async fn products_by_variant_sku(&self, sku: &str) -> StoreResult<Vec<Product>>;

    async fn products(&self) -> StoreResult<Vec<Product>>;

    /// Inserts or replaces a product with all its variants.
    async fn save_product(&self, product: &Product) -> StoreResult<()>;

    /// Re-derives an `in_stock`/`out_of_stock` status from the stock stored
    /// right now, in one atomic write. `preorder`/`backorder` are left alone.
    /// Returns the new level, or `None` when nothing had to change.
    async fn reconcile_stock_status(&self, product_id: &str, variant_id: &str) -> StoreResult<Option<StockLevel>>;

    /// Overwrites one variant's stock and status, returning the previous stock.
    async fn set_stock(&self, product_id: &str, variant_id: &str, stock: u32, status: StockStatus) -> StoreResult<Option<u32>>;

    async fn order(&self, order_id: &str) -> StoreResult<Option<Order>>;
}

/// Stock and status of a variant right after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub stock: u32,
    pub stock_status: StockStatus,
}

/// Writes that commit or abort together.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it back.
#[async_trait]
pub trait StockTransaction: Send {
    /// Decrements stock by `quantity` only if the stored stock is still at least
    /// `quantity`, recomputing the status in the same atomic write (zero reads
    /// `out_of_stock`; `preorder`/`backorder` survive while stock remains).
    /// Returns `None` when the condition failed.
    async fn decrement_stock(&mut self, product_id: &str, variant_id: &str, quantity: u32) -> StoreResult<Option<StockLevel>>;

    /// Increments stock unconditionally and marks the variant `in_stock`.
    /// Returns `None` if the variant is gone.
    async fn increment_stock(&mut self, product_id: &str, variant_id: &str, quantity: u32) -> StoreResult<Option<StockLevel>>;

    /// Inserts a new order or overwrites an existing one.
    async fn save_order(&mut self, order: &Order) -> StoreResult<()>;

    /// Writes `order` only if the stored copy is still in `expected` status.
    /// The row stays claimed until the transaction ends, so of two racing
    /// transitions from the same status exactly one returns `true`.
    async fn transition_order(&mut self, order: &Order, expected: OrderStatus) -> StoreResult<bool>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart(&self, user_id: &str) -> StoreResult<Option<Cart>>;
    async fn save_cart(&self, cart: &Cart) -> StoreResult<()>;
}

/// Outcome of folding a stock alert into the store.
#[derive(Debug, Clone)]
pub enum AlertUpsert {
    Created(Notification),
    Updated(Notification),
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts `alert`, or refreshes the unresolved alert with the same
    /// (kind, product, variant) in place. Atomic with respect to concurrent upserts.
    async fn upsert_open_alert(&self, alert: Notification) -> StoreResult<AlertUpsert>;

    async fn notification(&self, id: &str) -> StoreResult<Option<Notification>>;

    /// Matching notifications, newest first.
    async fn notifications(&self, filter: &NotificationFilter) -> StoreResult<Vec<Notification>>;

    async fn save_notification(&self, notification: &Notification) -> StoreResult<()>;

    async fn count_unread(&self) -> StoreResult<u64>;

    /// Marks every unread notification read; returns how many changed.
    async fn mark_all_read(&self) -> StoreResult<u64>;
}

/// Everything the services need from one backend.
pub trait Store: CatalogStore + CartStore + NotificationStore + 'static {}

impl<T> Store for T where T: CatalogStore + CartStore + NotificationStore + 'static {}
