//! Cart operations and the Cart Synchronizer.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::DEFAULT_CURRENCY;
use crate::domain::aggregates::{Cart, CartItem};
use crate::domain::value_objects::Quantity;
use crate::inventory::{InventoryService, StockQuery, StockRequestItem};
use crate::store::Store;
use crate::{InventoryError, Result};

/// An add-to-cart request; any subset of keys may identify the variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItem {
    #[serde(flatten)]
    pub target: StockQuery,
    pub quantity: i64,
}

pub struct CartService<S> {
    store: Arc<S>,
    inventory: InventoryService<S>,
}

impl<S> Clone for CartService<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), inventory: self.inventory.clone() } }
}

impl<S: Store> CartService<S> {
    pub fn new(inventory: InventoryService<S>) -> Self {
        Self { store: inventory.store().clone(), inventory }
    }

    /// The user's cart, synchronized against the catalog. A user without a
    /// cart gets an empty one that is not persisted until something is added.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: &str) -> Result<Cart> {
        let Some(mut cart) = self.store.cart(user_id).await? else {
            return Ok(Cart::for_user(user_id, DEFAULT_CURRENCY));
        };
        if self.synchronize(&mut cart).await? {
            self.store.save_cart(&cart).await?;
        }
        Ok(cart)
    }

    /// Repairs stale variant ids by SKU and refreshes each line's `outOfStock`
    /// flag. Returns true if the cart changed.
    async fn synchronize(&self, cart: &mut Cart) -> Result<bool> {
        let mut changed = false;
        let lines: Vec<CartItem> = cart.items().to_vec();

        for line in lines {
            let Some(product) = self.store.product(&line.product_id).await? else {
                warn!(cart_id = %cart.id(), product_id = %line.product_id, "cart line references a missing product");
                changed |= cart.flag_out_of_stock(&line.variant_id, true);
                continue;
            };

            let mut variant_id = line.variant_id.clone();
            if product.variant(&variant_id).is_none() {
                match product.variant_by_sku(line.variant_sku.as_str()) {
                    Some(current) if cart.item(&current.id).is_none() => {
                        info!(cart_id = %cart.id(), from = %variant_id, to = %current.id, sku = %line.variant_sku, "repointed stale cart line");
                        changed |= cart.repoint_variant(&variant_id, &current.id);
                        variant_id = current.id.clone();
                    }
                    _ => {
                        changed |= cart.flag_out_of_stock(&variant_id, true);
                        continue;
                    }
                }
            }

            let view = self.inventory.get_variant_stock(&StockQuery::by_variant(&variant_id)).await?;
            changed |= cart.flag_out_of_stock(&variant_id, !view.available);
        }
        Ok(changed)
    }

    /// Adds a line, or more of an existing line, after checking that the
    /// combined quantity is in stock.
    #[instrument(skip(self, request), fields(query = %request.target.describe(), quantity = request.quantity))]
    pub async fn add_item(&self, user_id: &str, request: AddCartItem) -> Result<Cart> {
        let quantity = Quantity::new(request.quantity)?.value();
        let resolved = self.inventory.resolve(&request.target).await?
            .ok_or_else(|| InventoryError::NotFound(request.target.describe()))?;
        let (product, variant) = (&resolved.product, &resolved.variant);
        if !resolved.view.available {
            return Err(InventoryError::InsufficientStock { requested: quantity, available: 0 });
        }

        let mut cart = match self.store.cart(user_id).await? {
            Some(cart) => cart,
            None => Cart::for_user(user_id, DEFAULT_CURRENCY),
        };
        let wanted = cart.item(&variant.id).map_or(0, |i| i.quantity).saturating_add(quantity);
        if wanted > variant.stock {
            return Err(InventoryError::InsufficientStock { requested: wanted, available: variant.stock });
        }

        cart.add_item(CartItem {
            product_id: product.id.clone(),
            variant_id: variant.id.clone(),
            variant_sku: variant.sku.clone(),
            name: format!("{} - {}", product.name, variant.name),
            quantity,
            unit_price: variant.price.clone(),
            mrp: variant.mrp.clone(),
            out_of_stock: false,
        })?;
        self.store.save_cart(&cart).await?;
        info!(cart_id = %cart.id(), variant_id = %variant.id, quantity, "added to cart");
        Ok(cart)
    }

    /// Sets a line's quantity. Zero removes the line; increases are checked
    /// against current stock first.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, user_id: &str, variant_id: &str, quantity: i64) -> Result<Cart> {
        let quantity = u32::try_from(quantity).map_err(|_| InventoryError::InvalidQuantity(quantity))?;
        let mut cart = self.store.cart(user_id).await?.ok_or(InventoryError::CartItemNotFound)?;
        let current = cart.item(variant_id).ok_or(InventoryError::CartItemNotFound)?.quantity;

        if quantity > current {
            let item = StockRequestItem::new(StockQuery::by_variant(variant_id), i64::from(quantity));
            let report = self.inventory.validate_stock_availability(&[item]).await?;
            if let Some(err) = report.first_error() {
                return Err(err);
            }
        }

        cart.update_quantity(variant_id, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn remove_item(&self, user_id: &str, variant_id: &str) -> Result<Cart> {
        let mut cart = self.store.cart(user_id).await?.ok_or(InventoryError::CartItemNotFound)?;
        cart.remove_item(variant_id)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn clear_cart(&self, user_id: &str) -> Result<Cart> {
        let Some(mut cart) = self.store.cart(user_id).await? else {
            return Ok(Cart::for_user(user_id, DEFAULT_CURRENCY));
        };
        cart.clear();
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }
}
