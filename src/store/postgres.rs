//! PostgreSQL store.
//!
//! Variants live in their own table so a reservation is one conditional
//! `UPDATE ... WHERE stock >= $q` on one row. Carts and orders are stored as
//! JSONB documents; notifications are relational so the open-alert dedup can
//! lean on a partial unique index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;

use super::{AlertUpsert, CartStore, CatalogStore, NotificationStore, StockLevel, StockTransaction, StoreError, StoreResult};
use crate::domain::aggregates::{
    AlertMetadata, Cart, Notification, NotificationFilter, Order, OrderStatus, Product, StockStatus, Variant,
};
use crate::domain::value_objects::{Money, Sku};

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool { &self.pool }

    async fn hydrate(&self, rows: Vec<ProductRow>) -> StoreResult<Vec<Product>> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let variant_rows = sqlx::query_as::<_, VariantRow>(
            "SELECT id, product_id, sku, name, price, mrp, currency, stock, stock_status, is_active, is_default \
             FROM product_variants WHERE product_id = ANY($1) ORDER BY product_id, position",
        )
        .bind(&ids).fetch_all(&self.pool).await?;

        let mut by_product: HashMap<String, Vec<Variant>> = HashMap::new();
        for row in variant_rows {
            let product_id = row.product_id.clone();
            by_product.entry(product_id).or_default().push(row.into_variant()?);
        }
        Ok(rows.into_iter().map(|r| {
            let variants = by_product.remove(&r.id).unwrap_or_default();
            Product { id: r.id, name: r.name, variants, created_at: r.created_at, updated_at: r.updated_at }
        }).collect())
    }
}

fn to_db_count(n: u32) -> StoreResult<i32> {
    i32::try_from(n).map_err(|_| StoreError::Corrupt(format!("count {n} out of range")))
}

fn from_db_count(n: i32) -> StoreResult<u32> {
    u32::try_from(n).map_err(|_| StoreError::Corrupt(format!("negative stock {n}")))
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow { id: String, name: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: String, product_id: String, sku: String, name: String, price: Decimal, mrp: Decimal,
    currency: String, stock: i32, stock_status: String, is_active: bool, is_default: bool,
}

impl VariantRow {
    fn into_variant(self) -> StoreResult<Variant> {
        Ok(Variant {
            sku: Sku::new(self.sku).map_err(|e| StoreError::Corrupt(format!("variant {}: {e}", self.id)))?,
            stock: from_db_count(self.stock)?,
            stock_status: self.stock_status.parse().map_err(StoreError::Corrupt)?,
            price: Money::new(self.price, &self.currency),
            mrp: Money::new(self.mrp, &self.currency),
            id: self.id, name: self.name, is_active: self.is_active, is_default: self.is_default,
        })
    }
}

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.created_at, p.updated_at";

#[async_trait]
impl CatalogStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        Ok(PgTx { tx: self.pool.begin().await? })
    }

    async fn product(&self, product_id: &str) -> StoreResult<Option<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"))
            .bind(product_id).fetch_all(&self.pool).await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn product_by_variant_id(&self, variant_id: &str) -> StoreResult<Option<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p JOIN product_variants v ON v.product_id = p.id WHERE v.id = $1"
        ))
        .bind(variant_id).fetch_all(&self.pool).await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn products_by_variant_sku(&self, sku: &str) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT DISTINCT {PRODUCT_COLUMNS} FROM products p JOIN product_variants v ON v.product_id = p.id \
             WHERE v.sku = $1 ORDER BY p.created_at, p.id"
        ))
        .bind(sku).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn products(&self) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products p ORDER BY p.created_at, p.id"))
            .fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn save_product(&self, product: &Product) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO products (id, name, created_at, updated_at) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, updated_at = EXCLUDED.updated_at")
            .bind(&product.id).bind(&product.name).bind(product.created_at).bind(product.updated_at)
            .execute(&mut *tx).await?;
        let keep: Vec<String> = product.variants.iter().map(|v| v.id.clone()).collect();
        sqlx::query("DELETE FROM product_variants WHERE product_id = $1 AND NOT (id = ANY($2))")
            .bind(&product.id).bind(&keep).execute(&mut *tx).await?;
        for (position, v) in product.variants.iter().enumerate() {
            sqlx::query(
                "INSERT INTO product_variants (id, product_id, position, sku, name, price, mrp, currency, stock, stock_status, is_active, is_default, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW()) \
                 ON CONFLICT (id) DO UPDATE SET position = EXCLUDED.position, sku = EXCLUDED.sku, name = EXCLUDED.name, \
                 price = EXCLUDED.price, mrp = EXCLUDED.mrp, currency = EXCLUDED.currency, stock = EXCLUDED.stock, \
                 stock_status = EXCLUDED.stock_status, is_active = EXCLUDED.is_active, is_default = EXCLUDED.is_default, updated_at = NOW()",
            )
            .bind(&v.id).bind(&product.id).bind(i32::try_from(position).map_err(|_| StoreError::Corrupt(format!("too many variants on {}", product.id)))?)
            .bind(v.sku.as_str()).bind(&v.name).bind(v.price.amount()).bind(v.mrp.amount()).bind(v.price.currency())
            .bind(to_db_count(v.stock)?).bind(v.stock_status.as_str()).bind(v.is_active).bind(v.is_default)
            .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn reconcile_stock_status(&self, product_id: &str, variant_id: &str) -> StoreResult<Option<StockLevel>> {
        let level = sqlx::query_as::<_, LevelRow>(
            "UPDATE product_variants SET stock_status = CASE WHEN stock > 0 THEN 'in_stock' ELSE 'out_of_stock' END, \
             updated_at = NOW() \
             WHERE product_id = $1 AND id = $2 AND stock_status IN ('in_stock', 'out_of_stock') \
             AND stock_status <> CASE WHEN stock > 0 THEN 'in_stock' ELSE 'out_of_stock' END \
             RETURNING stock, stock_status",
        )
        .bind(product_id).bind(variant_id)
        .fetch_optional(&self.pool).await?;
        level.map(LevelRow::into_level).transpose()
    }

    async fn set_stock(&self, product_id: &str, variant_id: &str, stock: u32, status: StockStatus) -> StoreResult<Option<u32>> {
        let previous = sqlx::query_scalar::<_, i32>(
            "UPDATE product_variants v SET stock = $3, stock_status = $4, updated_at = NOW() \
             FROM (SELECT id, stock FROM product_variants WHERE product_id = $1 AND id = $2 FOR UPDATE) old \
             WHERE v.id = old.id RETURNING old.stock",
        )
        .bind(product_id).bind(variant_id).bind(to_db_count(stock)?).bind(status.as_str())
        .fetch_optional(&self.pool).await?;
        previous.map(from_db_count).transpose()
    }

    async fn order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let doc = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE id = $1")
            .bind(order_id).fetch_optional(&self.pool).await?;
        Ok(doc.map(|Json(order)| order))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LevelRow { stock: i32, stock_status: String }

impl LevelRow {
    fn into_level(self) -> StoreResult<StockLevel> {
        Ok(StockLevel { stock: from_db_count(self.stock)?, stock_status: self.stock_status.parse().map_err(StoreError::Corrupt)? })
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("PgTx") }
}

#[async_trait]
impl StockTransaction for PgTx {
    async fn decrement_stock(&mut self, product_id: &str, variant_id: &str, quantity: u32) -> StoreResult<Option<StockLevel>> {
        let Ok(quantity) = i32::try_from(quantity) else { return Ok(None) };
        let level = sqlx::query_as::<_, LevelRow>(
            "UPDATE product_variants SET stock = stock - $3, \
             stock_status = CASE WHEN stock - $3 = 0 THEN 'out_of_stock' \
                                 WHEN stock_status IN ('preorder', 'backorder') THEN stock_status \
                                 ELSE 'in_stock' END, \
             updated_at = NOW() \
             WHERE product_id = $1 AND id = $2 AND stock >= $3 RETURNING stock, stock_status",
        )
        .bind(product_id).bind(variant_id).bind(quantity)
        .fetch_optional(&mut *self.tx).await?;
        level.map(LevelRow::into_level).transpose()
    }

    async fn increment_stock(&mut self, product_id: &str, variant_id: &str, quantity: u32) -> StoreResult<Option<StockLevel>> {
        let level = sqlx::query_as::<_, LevelRow>(
            "UPDATE product_variants SET stock = stock + $3, stock_status = 'in_stock', updated_at = NOW() \
             WHERE product_id = $1 AND id = $2 RETURNING stock, stock_status",
        )
        .bind(product_id).bind(variant_id).bind(to_db_count(quantity)?)
        .fetch_optional(&mut *self.tx).await?;
        level.map(LevelRow::into_level).transpose()
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, status, document, created_at, updated_at) VALUES ($1, $2, $3, $4, NOW(), NOW()) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, document = EXCLUDED.document, updated_at = NOW()",
        )
        .bind(order.id()).bind(order.user_id()).bind(order.status().as_str()).bind(Json(order))
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn transition_order(&mut self, order: &Order, expected: OrderStatus) -> StoreResult<bool> {
        let done = sqlx::query(
            "UPDATE orders SET status = $2, document = $3, updated_at = NOW() WHERE id = $1 AND status = $4",
        )
        .bind(order.id()).bind(order.status().as_str()).bind(Json(order)).bind(expected.as_str())
        .execute(&mut *self.tx).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(|e| StoreError::Aborted(e.to_string()))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart(&self, user_id: &str) -> StoreResult<Option<Cart>> {
        let doc = sqlx::query_scalar::<_, Json<Cart>>("SELECT cart FROM carts WHERE user_id = $1")
            .bind(user_id).fetch_optional(&self.pool).await?;
        Ok(doc.map(|Json(cart)| cart))
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        sqlx::query("INSERT INTO carts (user_id, cart, updated_at) VALUES ($1, $2, NOW()) \
                     ON CONFLICT (user_id) DO UPDATE SET cart = EXCLUDED.cart, updated_at = NOW()")
            .bind(cart.user_id()).bind(Json(cart)).execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String, kind: String, severity: String, title: String, message: String,
    product_id: Option<String>, variant_id: Option<String>, metadata: Json<AlertMetadata>,
    is_read: bool, action_required: bool, action_taken: bool, action_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_notification(self) -> StoreResult<Notification> {
        Ok(Notification {
            kind: self.kind.parse().map_err(StoreError::Corrupt)?,
            severity: self.severity.parse().map_err(StoreError::Corrupt)?,
            id: self.id, title: self.title, message: self.message,
            product_id: self.product_id, variant_id: self.variant_id, metadata: self.metadata.0,
            is_read: self.is_read, action_required: self.action_required, action_taken: self.action_taken,
            action_at: self.action_at, created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertedRow {
    #[sqlx(flatten)]
    notification: NotificationRow,
    inserted: bool,
}

const NOTIFICATION_COLUMNS: &str = "id, kind, severity, title, message, product_id, variant_id, metadata, \
    is_read, action_required, action_taken, action_at, created_at, updated_at";

#[async_trait]
impl NotificationStore for PgStore {
    async fn upsert_open_alert(&self, alert: Notification) -> StoreResult<AlertUpsert> {
        let upserted = sqlx::query_as::<_, UpsertedRow>(&format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9, FALSE, NULL, NOW(), NOW()) \
             ON CONFLICT (kind, product_id, variant_id) WHERE NOT action_taken \
             DO UPDATE SET title = EXCLUDED.title, message = EXCLUDED.message, metadata = EXCLUDED.metadata, \
             is_read = FALSE, updated_at = NOW() \
             RETURNING {NOTIFICATION_COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(&alert.id).bind(alert.kind.as_str()).bind(alert.severity.as_str()).bind(&alert.title).bind(&alert.message)
        .bind(&alert.product_id).bind(&alert.variant_id).bind(Json(&alert.metadata)).bind(alert.action_required)
        .fetch_one(&self.pool).await?;
        let notification = upserted.notification.into_notification()?;
        Ok(if upserted.inserted { AlertUpsert::Created(notification) } else { AlertUpsert::Updated(notification) })
    }

    async fn notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        sqlx::query_as::<_, NotificationRow>(&format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?
            .map(NotificationRow::into_notification).transpose()
    }

    async fn notifications(&self, filter: &NotificationFilter) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE ($1::text IS NULL OR kind = $1) AND ($2::text IS NULL OR severity = $2) \
             AND ($3::bool IS NULL OR is_read = $3) AND ($4::bool IS NULL OR action_taken = $4) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(filter.kind.map(|k| k.as_str())).bind(filter.severity.map(|s| s.as_str()))
        .bind(filter.is_read).bind(filter.action_taken)
        .fetch_all(&self.pool).await?;
        rows.into_iter().map(NotificationRow::into_notification).collect()
    }

    async fn save_notification(&self, n: &Notification) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET severity = EXCLUDED.severity, title = EXCLUDED.title, message = EXCLUDED.message, \
             metadata = EXCLUDED.metadata, is_read = EXCLUDED.is_read, action_required = EXCLUDED.action_required, \
             action_taken = EXCLUDED.action_taken, action_at = EXCLUDED.action_at, updated_at = EXCLUDED.updated_at"
        ))
        .bind(&n.id).bind(n.kind.as_str()).bind(n.severity.as_str()).bind(&n.title).bind(&n.message)
        .bind(&n.product_id).bind(&n.variant_id).bind(Json(&n.metadata)).bind(n.is_read).bind(n.action_required)
        .bind(n.action_taken).bind(n.action_at).bind(n.created_at).bind(n.updated_at)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn count_unread(&self) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE NOT is_read")
            .fetch_one(&self.pool).await?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("unread count {count}")))
    }

    async fn mark_all_read(&self) -> StoreResult<u64> {
        let done = sqlx::query("UPDATE notifications SET is_read = TRUE, updated_at = NOW() WHERE NOT is_read")
            .execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}
