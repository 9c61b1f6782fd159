//! One-shot reconciliation: rewrites every in/out-of-stock status that
//! disagrees with its variant's stock, then exits.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_inventory::config::AppConfig;
use storefront_inventory::domain::events::{DomainEvent, InventoryEvent};
use storefront_inventory::inventory::InventoryService;
use storefront_inventory::publisher::{EventPublisher, NatsPublisher};
use storefront_inventory::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;
    let Some(url) = config.database_url.as_deref() else { bail!("DATABASE_URL must be set to reconcile stock statuses") };

    let store = PgStore::connect(url, config.database_max_connections).await?;
    store.migrate().await?;
    let report = InventoryService::new(Arc::new(store), config.thresholds).sync_all_stock_statuses().await?;
    tracing::info!(updated_count = report.updated_count, scanned_count = report.scanned_count, "stock status sync complete");

    if let Some(nats_url) = config.nats_url.as_deref() {
        let publisher = NatsPublisher::connect(nats_url).await?;
        publisher.publish(&DomainEvent::Inventory(InventoryEvent::StatusReconciled { updated_count: report.updated_count })).await;
        publisher.flush().await?;
    }
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
