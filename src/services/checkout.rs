//! Checkout: order placement and cancellation.
//!
//! Stock debits and the order record share one transaction, so an order is
//! either written with every line reserved or not written at all. Closing an
//! order claims it with a conditional status write in the same transaction
//! as the stock credit, so its stock is returned at most once.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::CartService;
use crate::domain::aggregates::{Cart, LineItem, Order, OrderError, OrderStatus};
use crate::domain::events::DomainEvent;
use crate::inventory::{InventoryService, ReleaseOutcome, ReservationOutcome, StockQuery, StockRequestItem};
use crate::publisher::EventPublisher;
use crate::store::{StockTransaction, Store};
use crate::{InventoryError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: Order,
    pub reservations: ReservationOutcome,
}

pub struct CheckoutService<S> {
    store: Arc<S>,
    inventory: InventoryService<S>,
    carts: CartService<S>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S> Clone for CheckoutService<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), inventory: self.inventory.clone(), carts: self.carts.clone(), publisher: self.publisher.clone() }
    }
}

fn request_items<'a>(lines: impl Iterator<Item = (&'a str, u32)>) -> Vec<StockRequestItem> {
    lines.map(|(variant_id, quantity)| StockRequestItem::new(StockQuery::by_variant(variant_id), i64::from(quantity))).collect()
}

impl<S: Store> CheckoutService<S> {
    pub fn new(inventory: InventoryService<S>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store: inventory.store().clone(), carts: CartService::new(inventory.clone()), inventory, publisher }
    }

    /// Turns the user's cart into a confirmed order.
    #[instrument(skip(self))]
    pub async fn place_order(&self, user_id: &str) -> Result<PlacedOrder> {
        let mut cart = self.carts.get_cart(user_id).await?;
        if cart.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        if let Some(line) = cart.items().iter().find(|i| i.out_of_stock) {
            let view = self.inventory.get_variant_stock(&StockQuery::by_variant(&line.variant_id)).await?;
            if !view.is_found() {
                return Err(InventoryError::NotFound(format!("variant {}", line.variant_id)));
            }
            return Err(InventoryError::InsufficientStock { requested: line.quantity, available: if view.available { view.stock } else { 0 } });
        }

        let mut tx = self.store.begin().await?;
        let (mut order, reservations) = match self.reserve_and_record(&cart, &mut tx).await {
            Ok(placed) => placed,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "failed to roll back checkout");
                }
                warn!(user_id, error = %e, "checkout aborted");
                return Err(e);
            }
        };
        tx.commit().await?;
        info!(order_id = %order.id(), order_number = %order.order_number(), lines = order.items().len(), "order placed");
        self.inventory.emit_stock_alerts(&reservations).await;

        cart.clear();
        if let Err(e) = self.store.save_cart(&cart).await {
            warn!(user_id, error = %e, "order placed but cart was not cleared");
        }

        let mut events: Vec<DomainEvent> = reservations.reservations.iter().map(|r| r.event()).collect();
        events.extend(order.take_events());
        self.publisher.publish_all(&events).await;

        Ok(PlacedOrder { order, reservations })
    }

    async fn reserve_and_record(&self, cart: &Cart, tx: &mut S::Tx) -> Result<(Order, ReservationOutcome)> {
        let items = request_items(cart.items().iter().map(|i| (i.variant_id.as_str(), i.quantity)));
        let outcome = self.inventory.reserve_stock(&items, tx).await?;

        let mut order = Order::create(cart.user_id(), cart.total_amount().currency());
        for (line, reserved) in cart.items().iter().zip(&outcome.reservations) {
            order.add_item(LineItem {
                product_id: reserved.product_id.clone(),
                variant_id: reserved.variant_id.clone(),
                sku: line.variant_sku.clone(),
                name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price.clone(),
                total: line.line_total(),
            });
        }
        order.confirm()?;
        tx.save_order(&order).await?;
        Ok((order, outcome))
    }

    /// Cancels a pending or confirmed order and puts its stock back.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order> {
        self.close_order(order_id, Order::cancel).await
    }

    /// Refunds a confirmed order and puts its stock back.
    #[instrument(skip(self))]
    pub async fn refund_order(&self, order_id: &str) -> Result<Order> {
        self.close_order(order_id, Order::refund).await
    }

    async fn close_order(&self, order_id: &str, transition: fn(&mut Order) -> std::result::Result<(), OrderError>) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        let from = order.status();
        transition(&mut order)?;

        let mut tx = self.store.begin().await?;
        let released = match self.claim_and_release(&order, from, &mut tx).await {
            Ok(released) => released,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "failed to roll back order close");
                }
                warn!(order_id, error = %e, "order close aborted");
                return Err(e);
            }
        };
        tx.commit().await?;
        info!(order_id, status = order.status().as_str(), lines = released.releases.len(), "order closed");

        let mut events: Vec<DomainEvent> = released.releases.iter().map(|r| r.event()).collect();
        events.extend(order.take_events());
        self.publisher.publish_all(&events).await;
        Ok(order)
    }

    async fn claim_and_release(&self, order: &Order, from: OrderStatus, tx: &mut S::Tx) -> Result<ReleaseOutcome> {
        if !tx.transition_order(order, from).await? {
            return Err(InventoryError::InvalidOrderState(format!("order {} is no longer {}", order.id(), from.as_str())));
        }
        let items = request_items(order.items().iter().map(|i| (i.variant_id.as_str(), i.quantity)));
        self.inventory.release_stock(&items, tx).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.store.order(order_id).await?.ok_or(InventoryError::OrderNotFound)
    }
}
