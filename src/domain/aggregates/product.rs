//! Product Aggregate
//!
//! A product embeds its variants; each variant carries the authoritative
//! `stock` integer and the cached `stock_status` derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub sku: Sku,
    pub name: String,
    pub price: Money,
    pub mrp: Money,
    pub stock: u32,
    pub stock_status: StockStatus,
    pub is_active: bool,
    pub is_default: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    OutOfStock,
    Preorder,
    Backorder,
}

impl StockStatus {
    /// The `in_stock`/`out_of_stock` value implied by a stock count.
    pub fn derived(stock: u32) -> Self {
        if stock > 0 { Self::InStock } else { Self::OutOfStock }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::OutOfStock => "out_of_stock",
            Self::Preorder => "preorder",
            Self::Backorder => "backorder",
        }
    }

    /// `preorder` and `backorder` are set by an admin and are not derived.
    pub fn is_override(&self) -> bool { matches!(self, Self::Preorder | Self::Backorder) }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for StockStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(Self::InStock),
            "out_of_stock" => Ok(Self::OutOfStock),
            "preorder" => Ok(Self::Preorder),
            "backorder" => Ok(Self::Backorder),
            other => Err(format!("unknown stock status: {other}")),
        }
    }
}

impl Variant {
    pub fn new(sku: Sku, name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: Uuid::now_v7().to_string(), sku, name: name.into(), mrp: price.clone(), price,
            stock, stock_status: StockStatus::derived(stock), is_active: true, is_default: false,
        }
    }

    pub fn with_mrp(mut self, mrp: Money) -> Self { self.mrp = mrp; self }
    pub fn as_default(mut self) -> Self { self.is_default = true; self }
    pub fn inactive(mut self) -> Self { self.is_active = false; self }

    /// Sellable right now: has stock, is not flagged out of stock, is active.
    pub fn is_available(&self) -> bool {
        self.stock > 0 && self.stock_status != StockStatus::OutOfStock && self.is_active
    }

    /// The status this variant should carry, or `None` when the cached one is consistent.
    ///
    /// Only the `in_stock`/`out_of_stock` pair is derived; overrides are left alone.
    pub fn status_correction(&self) -> Option<StockStatus> {
        let wanted = match self.stock_status {
            StockStatus::InStock | StockStatus::OutOfStock => StockStatus::derived(self.stock),
            other => other,
        };
        (wanted != self.stock_status).then_some(wanted)
    }

    /// Status to persist after an admin sets stock explicitly.
    pub fn status_after_stock_set(&self, stock: u32) -> StockStatus {
        if stock > 0 && self.stock_status.is_override() { self.stock_status } else { StockStatus::derived(stock) }
    }
}

impl Product {
    pub fn create(name: impl Into<String>, variants: Vec<Variant>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7().to_string(), name: name.into(), variants, created_at: now, updated_at: now }
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn variant_mut(&mut self, variant_id: &str) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.id == variant_id)
    }

    pub fn variant_by_sku(&self, sku: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.sku.as_str() == sku)
    }

    /// The default variant, or the first one when none is marked default.
    pub fn default_variant(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_default).or_else(|| self.variants.first())
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}
