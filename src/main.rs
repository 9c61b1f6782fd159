//! Storefront Inventory - stock, cart and checkout service

use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_inventory::api::{self, AppState};
use storefront_inventory::config::AppConfig;
use storefront_inventory::domain::aggregates::{Product, Variant};
use storefront_inventory::domain::value_objects::{Money, Sku};
use storefront_inventory::publisher::{EventPublisher, NatsPublisher, NoopPublisher};
use storefront_inventory::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;

    let publisher: Arc<dyn EventPublisher> = match config.nats_url.as_deref() {
        Some(url) => match NatsPublisher::connect(url).await {
            Ok(p) => Arc::new(p),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, events will not be published"); Arc::new(NoopPublisher) }
        },
        None => Arc::new(NoopPublisher),
    };

    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            serve(Arc::new(store), &config, publisher).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store with a demo catalog");
            serve(Arc::new(demo_store().await?), &config, publisher).await
        }
    }
}

async fn serve<S: Store>(store: Arc<S>, config: &AppConfig, publisher: Arc<dyn EventPublisher>) -> Result<()> {
    let app = api::router(AppState::new(store, config.thresholds, publisher));
    tracing::info!("Storefront inventory listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

async fn demo_store() -> Result<MemoryStore> {
    let variant = |sku: &str, name: &str, price: i64, stock: u32| -> Result<Variant> {
        Ok(Variant::new(Sku::new(sku)?, name, Money::inr(Decimal::new(price, 0)), stock))
    };
    Ok(MemoryStore::with_products([
        Product::create("Rose Attar", vec![variant("RA-10", "10ml", 899, 12)?.as_default(), variant("RA-30", "30ml", 2199, 3)?]),
        Product::create("Kundan Earrings", vec![variant("KE-GLD", "Gold", 4500, 1)?]),
    ]).await)
}
