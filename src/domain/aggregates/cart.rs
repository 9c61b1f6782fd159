//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: String,
    user_id: String,
    items: Vec<CartItem>,
    total_amount: Money,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A cart line. Product and variant are weak references by id.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub variant_id: String,
    pub variant_sku: Sku,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub mrp: Money,
    pub out_of_stock: bool,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

impl Cart {
    pub fn for_user(user_id: impl Into<String>, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(), user_id: user_id.into(), items: vec![],
            total_amount: Money::zero(currency), currency: currency.to_string(),
            created_at: now, updated_at: now,
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn total_amount(&self) -> &Money { &self.total_amount }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn item(&self, variant_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.variant_id == variant_id)
    }

    /// Adds a line, merging quantities with an existing line for the same variant.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.unit_price.currency() != self.currency { return Err(CartError::CurrencyMismatch); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id && i.variant_id == item.variant_id) {
            existing.quantity += item.quantity;
            existing.unit_price = item.unit_price;
            existing.mrp = item.mrp;
            existing.out_of_stock = item.out_of_stock;
        } else {
            self.items.push(item);
        }
        self.recalculate();
        Ok(())
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, variant_id: &str, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.variant_id == variant_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.variant_id != variant_id); }
        else { item.quantity = quantity; }
        self.recalculate();
        Ok(())
    }

    pub fn remove_item(&mut self, variant_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.variant_id != variant_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.recalculate();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.recalculate(); }

    /// Points the line at `from` to the variant `to`. Returns false if no line matched.
    pub fn repoint_variant(&mut self, from: &str, to: &str) -> bool {
        match self.items.iter_mut().find(|i| i.variant_id == from) {
            Some(item) => { item.variant_id = to.to_string(); self.touch(); true }
            None => false,
        }
    }

    /// Updates the cached availability flag. Returns true if it changed.
    pub fn flag_out_of_stock(&mut self, variant_id: &str, out_of_stock: bool) -> bool {
        match self.items.iter_mut().find(|i| i.variant_id == variant_id) {
            Some(item) if item.out_of_stock != out_of_stock => { item.out_of_stock = out_of_stock; self.touch(); true }
            _ => false,
        }
    }

    fn recalculate(&mut self) {
        self.total_amount = self.items.iter().fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc));
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, CurrencyMismatch }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::ItemNotFound => write!(f, "Item not found"), Self::CurrencyMismatch => write!(f, "Currency mismatch") }
    }
}
