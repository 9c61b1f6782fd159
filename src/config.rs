//! Environment configuration.

use anyhow::{Context, Result};
use std::str::FromStr;

use crate::inventory::StockThresholds;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub port: u16,
    pub thresholds: StockThresholds,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { database_url: None, database_max_connections: 10, nats_url: None, port: 8083, thresholds: StockThresholds::default() }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            nats_url: non_empty("NATS_URL"),
            port: parsed(&lookup, "PORT", defaults.port)?,
            thresholds: StockThresholds {
                low_stock: parsed(&lookup, "LOW_STOCK_THRESHOLD", defaults.thresholds.low_stock)?,
                batch_low_stock: parsed(&lookup, "BATCH_LOW_STOCK_THRESHOLD", defaults.thresholds.batch_low_stock)?,
            },
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.thresholds.low_stock, 5);
        assert_eq!(config.thresholds.batch_low_stock, 10);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("PORT", "9000"),
            ("LOW_STOCK_THRESHOLD", "3"),
            ("NATS_URL", ""),
        ])).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.thresholds.low_stock, 3);
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
